use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use staydesk_core::{Aggregate, AggregateId, DomainError, TenantId};
use staydesk_events::EventEnvelope;
use staydesk_guests::{GUEST_AGGREGATE_TYPE, Guest, GuestEvent, GuestId, OccupancyStatus};

use crate::read_model::{TenantStore, TenantStoreError};

/// Largest page a directory query may ask for.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Directory ordering.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum DirectorySort {
    /// Registration order, oldest first.
    #[default]
    Registration,
    /// Last name, then first name, case-insensitive.
    Name,
    /// Most recent registration first.
    Newest,
}

impl FromStr for DirectorySort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "registration" => Ok(DirectorySort::Registration),
            "name" => Ok(DirectorySort::Name),
            "newest" => Ok(DirectorySort::Newest),
            other => Err(DomainError::validation(format!(
                "unknown sort '{other}' (expected registration, name or newest)"
            ))),
        }
    }
}

/// A directory search request. `page` and `page_size` are taken as given and
/// clamped by [`DirectoryQuery::pagination`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryQuery {
    pub text: Option<String>,
    pub status: Option<OccupancyStatus>,
    pub sort: DirectorySort,
    pub page: i64,
    pub page_size: i64,
}

impl DirectoryQuery {
    /// `(page, page_size)` after clamping: both at least 1, page size at most
    /// [`MAX_PAGE_SIZE`].
    pub fn pagination(&self) -> (u32, u32) {
        let page = self.page.clamp(1, u32::MAX as i64) as u32;
        let page_size = self.page_size.clamp(1, MAX_PAGE_SIZE as i64) as u32;
        (page, page_size)
    }

    fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPage {
    pub items: Vec<Guest>,
    pub total: usize,
    pub total_pages: usize,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum GuestDirectoryError {
    #[error("failed to deserialize guest event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The envelope is ahead of what this projection has seen for the stream.
    /// Feed the missing events (or the whole stream) first.
    #[error("sequence gap (last={last}, found={found})")]
    SequenceGap { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,

    #[error(transparent)]
    ReadModel(#[from] TenantStoreError),
}

/// Guest directory read model.
///
/// Folds committed guest envelopes into one `Guest` row per guest, per tenant,
/// and answers paginated searches over them.
///
/// - Idempotent: envelopes at or below the per-stream cursor are skipped.
/// - Gap-free: an envelope more than one ahead of the cursor is rejected.
/// - Applies are serialized, so concurrent writers cannot regress a row.
#[derive(Debug)]
pub struct GuestDirectoryProjection<S>
where
    S: TenantStore<GuestId, Guest>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> GuestDirectoryProjection<S>
where
    S: TenantStore<GuestId, Guest>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, guest_id: &GuestId) -> Option<Guest> {
        self.store.get(tenant_id, guest_id)
    }

    /// All guests of a tenant, in registration order.
    pub fn list(&self, tenant_id: TenantId) -> Vec<Guest> {
        self.store.list(tenant_id)
    }

    /// Filter, order and paginate a tenant's guests.
    pub fn search(&self, tenant_id: TenantId, query: &DirectoryQuery) -> DirectoryPage {
        let (page, page_size) = query.pagination();
        let needle = query.needle();

        let mut matches: Vec<Guest> = self
            .list(tenant_id)
            .into_iter()
            .filter(|g| query.status.is_none_or(|s| g.occupancy().status() == s))
            .filter(|g| needle.as_deref().is_none_or(|n| matches_text(g, n)))
            .collect();

        match query.sort {
            DirectorySort::Registration => {}
            DirectorySort::Newest => matches.reverse(),
            DirectorySort::Name => matches.sort_by_cached_key(|g| {
                (
                    g.profile().last_name.to_lowercase(),
                    g.profile().first_name.to_lowercase(),
                )
            }),
        }

        let total = matches.len();
        let total_pages = total.div_ceil(page_size as usize);
        let offset = (page as usize - 1).saturating_mul(page_size as usize);
        let items = matches.into_iter().skip(offset).take(page_size as usize).collect();

        DirectoryPage {
            items,
            total,
            total_pages,
            page,
            page_size,
        }
    }

    /// Apply one committed envelope.
    ///
    /// Envelopes of other aggregate types are ignored so the projection can sit
    /// on a shared bus.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), GuestDirectoryError> {
        if envelope.aggregate_type() != GUEST_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let key = CursorKey { tenant_id, aggregate_id };

        // Held until the row is written: this is what serializes applies.
        let mut cursors = self.cursors.write().map_err(|_| GuestDirectoryError::Poisoned)?;
        let last = cursors.get(&key).copied().unwrap_or(0);

        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(GuestDirectoryError::SequenceGap { last, found: seq });
        }

        let event: GuestEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| GuestDirectoryError::Deserialize(e.to_string()))?;

        if event.tenant_id() != tenant_id {
            return Err(GuestDirectoryError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        let guest_id = event.guest_id();
        if guest_id.0 != aggregate_id {
            return Err(GuestDirectoryError::TenantIsolation(
                "event guest_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut guest = self
            .store
            .get(tenant_id, &guest_id)
            .unwrap_or_else(|| Guest::empty(guest_id));
        guest.apply(&event);
        self.store.upsert(tenant_id, guest_id, guest)?;

        cursors.insert(key, seq);
        Ok(())
    }

    /// Clear every tenant that appears in `envelopes` and replay them.
    ///
    /// Envelopes must be in commit order; the directory's registration order is
    /// the order in which first events appear.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<usize, GuestDirectoryError> {
        let envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();

        {
            let mut cursors = self.cursors.write().map_err(|_| GuestDirectoryError::Poisoned)?;
            for t in &tenants {
                self.store.clear_tenant(*t)?;
                cursors.retain(|k, _| k.tenant_id != *t);
            }
        }

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(envs.len())
    }
}

fn matches_text(guest: &Guest, needle: &str) -> bool {
    let p = guest.profile();
    p.first_name.to_lowercase().contains(needle)
        || p.last_name.to_lowercase().contains(needle)
        || p.full_name().to_lowercase().contains(needle)
        || p.email.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use staydesk_guests::{DeactivateGuest, GuestProfile, GuestRegistered, Occupancy};

    use crate::read_model::InMemoryTenantStore;

    type Projection = GuestDirectoryProjection<InMemoryTenantStore<GuestId, Guest>>;

    struct Stream {
        tenant_id: TenantId,
        guest_id: GuestId,
        seq: u64,
    }

    impl Stream {
        fn new(tenant_id: TenantId) -> Self {
            Self {
                tenant_id,
                guest_id: GuestId::new(AggregateId::new()),
                seq: 0,
            }
        }

        fn envelope(&mut self, event: GuestEvent) -> EventEnvelope<JsonValue> {
            self.seq += 1;
            EventEnvelope::new(
                Uuid::now_v7(),
                self.tenant_id,
                self.guest_id.0,
                GUEST_AGGREGATE_TYPE,
                self.seq,
                serde_json::to_value(event).unwrap(),
            )
        }

        fn registered(&mut self, first: &str, last: &str, email: &str) -> EventEnvelope<JsonValue> {
            let event = GuestEvent::GuestRegistered(GuestRegistered {
                tenant_id: self.tenant_id,
                guest_id: self.guest_id,
                profile: GuestProfile {
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    email: email.to_string(),
                    phone: None,
                },
                occupancy: Occupancy::active(
                    "101",
                    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
                )
                .unwrap(),
                occurred_at: Utc::now(),
            });
            self.envelope(event)
        }

        fn deactivated(&mut self) -> EventEnvelope<JsonValue> {
            let stay = staydesk_guests::StayRecord::new(
                "101".to_string(),
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            );
            let event = GuestEvent::GuestDeactivated(staydesk_guests::GuestDeactivated {
                tenant_id: self.tenant_id,
                guest_id: self.guest_id,
                stay,
                occurred_at: Utc::now(),
            });
            self.envelope(event)
        }
    }

    fn projection() -> Projection {
        GuestDirectoryProjection::new(InMemoryTenantStore::new())
    }

    fn query(text: Option<&str>, status: Option<OccupancyStatus>, page: i64, page_size: i64) -> DirectoryQuery {
        DirectoryQuery {
            text: text.map(str::to_string),
            status,
            sort: DirectorySort::Registration,
            page,
            page_size,
        }
    }

    /// Alice Smith (active), Bob Jones (inactive), Carol Smithers (active).
    fn seeded() -> (Projection, TenantId) {
        let p = projection();
        let t = TenantId::new();

        let mut alice = Stream::new(t);
        let mut bob = Stream::new(t);
        let mut carol = Stream::new(t);
        p.apply_envelope(&alice.registered("Alice", "Smith", "alice@example.com")).unwrap();
        p.apply_envelope(&bob.registered("Bob", "Jones", "bob@hotel.test")).unwrap();
        p.apply_envelope(&carol.registered("Carol", "Smithers", "carol@example.com")).unwrap();
        p.apply_envelope(&bob.deactivated()).unwrap();

        (p, t)
    }

    fn first_names(page: &DirectoryPage) -> Vec<String> {
        page.items.iter().map(|g| g.profile().first_name.clone()).collect()
    }

    #[test]
    fn text_search_matches_names_full_name_and_email() {
        let (p, t) = seeded();

        assert_eq!(first_names(&p.search(t, &query(Some("smith"), None, 1, 10))), ["Alice", "Carol"]);
        assert_eq!(first_names(&p.search(t, &query(Some("ALICE SM"), None, 1, 10))), ["Alice"]);
        assert_eq!(first_names(&p.search(t, &query(Some("hotel.test"), None, 1, 10))), ["Bob"]);
        assert_eq!(p.search(t, &query(Some("   "), None, 1, 10)).total, 3);
    }

    #[test]
    fn status_filter_uses_occupancy() {
        let (p, t) = seeded();

        let active = p.search(t, &query(None, Some(OccupancyStatus::Active), 1, 10));
        assert_eq!(first_names(&active), ["Alice", "Carol"]);

        let inactive = p.search(t, &query(Some("smith"), Some(OccupancyStatus::Inactive), 1, 10));
        assert_eq!(inactive.total, 0);
        assert!(inactive.items.is_empty());
        assert_eq!(inactive.total_pages, 0);
    }

    #[test]
    fn pagination_counts_pages_and_clamps_inputs() {
        let (p, t) = seeded();

        let page2 = p.search(t, &query(None, None, 2, 2));
        assert_eq!(first_names(&page2), ["Carol"]);
        assert_eq!(page2.total, 3);
        assert_eq!(page2.total_pages, 2);

        let past_end = p.search(t, &query(None, None, 9, 2));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 3);

        let clamped = p.search(t, &query(None, None, 0, 0));
        assert_eq!((clamped.page, clamped.page_size), (1, 1));
        assert_eq!(first_names(&clamped), ["Alice"]);
        assert_eq!(clamped.total_pages, 3);

        assert_eq!(query(None, None, 1, 10_000).pagination(), (1, MAX_PAGE_SIZE));
    }

    #[test]
    fn sort_orders() {
        let (p, t) = seeded();

        let mut q = query(None, None, 1, 10);
        q.sort = DirectorySort::Name;
        assert_eq!(first_names(&p.search(t, &q)), ["Bob", "Alice", "Carol"]);

        q.sort = DirectorySort::Newest;
        assert_eq!(first_names(&p.search(t, &q)), ["Carol", "Bob", "Alice"]);

        assert_eq!("Newest".parse::<DirectorySort>().unwrap(), DirectorySort::Newest);
        assert!("oldest".parse::<DirectorySort>().is_err());
    }

    #[test]
    fn replayed_envelope_is_a_no_op() {
        let p = projection();
        let t = TenantId::new();
        let mut s = Stream::new(t);

        let reg = s.registered("Dana", "Lee", "dana@example.com");
        let out = s.deactivated();
        p.apply_envelope(&reg).unwrap();
        p.apply_envelope(&out).unwrap();
        let before = p.get(t, &s.guest_id).unwrap();

        p.apply_envelope(&reg).unwrap();
        p.apply_envelope(&out).unwrap();

        let after = p.get(t, &s.guest_id).unwrap();
        assert_eq!(before, after);
        assert_eq!(after.stay_history().len(), 1);
    }

    #[test]
    fn sequence_gap_is_rejected() {
        let p = projection();
        let mut s = Stream::new(TenantId::new());
        let _skipped = s.registered("Eve", "Park", "eve@example.com");
        let out = s.deactivated();

        let err = p.apply_envelope(&out).unwrap_err();
        assert!(matches!(err, GuestDirectoryError::SequenceGap { last: 0, found: 2 }));
    }

    #[test]
    fn tenants_are_isolated() {
        let (p, t) = seeded();
        let other = TenantId::new();

        assert_eq!(p.search(other, &query(None, None, 1, 10)).total, 0);
        assert!(p.list(t).iter().all(|g| g.tenant_id() == Some(t)));
    }

    #[test]
    fn mismatched_event_tenant_is_rejected() {
        let p = projection();
        let mut s = Stream::new(TenantId::new());
        let env = s.registered("Finn", "Ray", "finn@example.com");
        let forged = EventEnvelope::new(
            env.event_id(),
            TenantId::new(),
            env.aggregate_id(),
            GUEST_AGGREGATE_TYPE,
            1,
            env.payload().clone(),
        );

        assert!(matches!(
            p.apply_envelope(&forged).unwrap_err(),
            GuestDirectoryError::TenantIsolation(_)
        ));
    }

    #[test]
    fn rebuild_from_scratch_restores_registration_order() {
        let t = TenantId::new();
        let mut a = Stream::new(t);
        let mut b = Stream::new(t);
        let log = vec![
            a.registered("Gina", "Zed", "gina@example.com"),
            b.registered("Hal", "Young", "hal@example.com"),
            a.deactivated(),
        ];

        let p = projection();
        // Stale state that the rebuild must discard.
        p.apply_envelope(&log[0]).unwrap();

        assert_eq!(p.rebuild_from_scratch(log.clone()).unwrap(), 3);
        let page = p.search(t, &query(None, None, 1, 10));
        assert_eq!(first_names(&page), ["Gina", "Hal"]);
        assert!(!page.items[0].is_active());

        // Envelopes of other aggregate types are ignored.
        let foreign = EventEnvelope::new(Uuid::now_v7(), t, AggregateId::new(), "other.thing", 1, JsonValue::Null);
        p.apply_envelope(&foreign).unwrap();
        assert_eq!(p.list(t).len(), 2);
    }

    /// Fails the next `upsert`, then behaves like the in-memory store.
    struct FlakyStore {
        inner: InMemoryTenantStore<GuestId, Guest>,
        fail_next_write: std::sync::atomic::AtomicBool,
    }

    impl TenantStore<GuestId, Guest> for FlakyStore {
        fn get(&self, tenant_id: TenantId, key: &GuestId) -> Option<Guest> {
            self.inner.get(tenant_id, key)
        }

        fn upsert(&self, tenant_id: TenantId, key: GuestId, value: Guest) -> Result<(), TenantStoreError> {
            if self.fail_next_write.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(TenantStoreError::Poisoned);
            }
            self.inner.upsert(tenant_id, key, value)
        }

        fn list(&self, tenant_id: TenantId) -> Vec<Guest> {
            self.inner.list(tenant_id)
        }

        fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), TenantStoreError> {
            self.inner.clear_tenant(tenant_id)
        }
    }

    #[test]
    fn failed_row_write_does_not_advance_the_cursor() {
        let p = GuestDirectoryProjection::new(FlakyStore {
            inner: InMemoryTenantStore::new(),
            fail_next_write: std::sync::atomic::AtomicBool::new(true),
        });
        let t = TenantId::new();
        let mut s = Stream::new(t);
        let registered = s.registered("Ivy", "Lane", "ivy@example.com");

        let err = p.apply_envelope(&registered).unwrap_err();
        assert!(matches!(err, GuestDirectoryError::ReadModel(TenantStoreError::Poisoned)));
        assert!(p.get(t, &s.guest_id).is_none());

        // Redelivery is applied, not skipped as a duplicate.
        p.apply_envelope(&registered).unwrap();
        assert_eq!(p.get(t, &s.guest_id).unwrap().profile().first_name, "Ivy");
    }
}
