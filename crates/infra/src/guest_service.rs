//! Guest lifecycle facade: occupancy, loyalty, profile and directory queries.
//!
//! Every mutating operation goes through the [`CommandDispatcher`]. The service
//! holds its own subscription to the dispatcher's bus and drains it into the
//! directory projection before returning, so a caller always sees its own
//! write in [`GuestService::search`].

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use staydesk_core::{AggregateId, AggregateRoot, DomainError, TenantId};
use staydesk_events::{Command, EventBus, EventEnvelope, Subscription};
use staydesk_guests::{
    ActivateGuest, CorrectProfile, DeactivateGuest, EnrollLoyalty, GUEST_AGGREGATE_TYPE, Guest, GuestCommand,
    GuestId, GuestProfile, RecordLogin, RegisterGuest, StayRecord, UnenrollLoyalty, UpdateOccupancy,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::projections::guest_directory::{
    DirectoryPage, DirectoryQuery, GuestDirectoryError, GuestDirectoryProjection,
};
use crate::read_model::InMemoryTenantStore;

/// The directory read model used by the service.
pub type GuestDirectory = GuestDirectoryProjection<InMemoryTenantStore<GuestId, Guest>>;

/// Caller-facing error kinds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuestError {
    #[error("guest not found")]
    NotFound,

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    /// Another writer changed the guest first. Safe to retry after a reload.
    #[error("{0}")]
    Conflict(String),

    /// The record store could not be reached. Retryable.
    #[error("guest record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for GuestError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => GuestError::Validation(msg),
            DomainError::InvalidState(msg) => GuestError::InvalidState(msg),
            DomainError::NotFound => GuestError::NotFound,
            DomainError::Conflict(msg) => GuestError::Conflict(msg),
            DomainError::InvariantViolation(msg) => GuestError::Internal(msg),
        }
    }
}

impl From<EventStoreError> for GuestError {
    fn from(value: EventStoreError) -> Self {
        if value.is_transient() {
            return GuestError::StoreUnavailable(value.to_string());
        }
        match value {
            EventStoreError::Concurrency(msg) => GuestError::Conflict(msg),
            other => GuestError::Internal(other.to_string()),
        }
    }
}

impl From<DispatchError> for GuestError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(err) => err.into(),
            DispatchError::Concurrency(msg) => GuestError::Conflict(msg),
            DispatchError::Store(err) => err.into(),
            other @ (DispatchError::TenantIsolation(_) | DispatchError::Deserialize(_)) => {
                GuestError::Internal(other.to_string())
            }
        }
    }
}

impl From<GuestDirectoryError> for GuestError {
    fn from(value: GuestDirectoryError) -> Self {
        GuestError::Internal(value.to_string())
    }
}

/// Input for [`GuestService::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGuest {
    pub profile: GuestProfile,
    pub room_number: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

/// Partial profile correction; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileCorrection {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Partial occupancy edit; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccupancyChange {
    pub room_number: Option<String>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
}

pub struct GuestService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    directory: GuestDirectory,
    feed: Mutex<Subscription<EventEnvelope<JsonValue>>>,
}

impl<S, B> GuestService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B) -> Self {
        let feed = Mutex::new(bus.subscribe());
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            directory: GuestDirectoryProjection::new(InMemoryTenantStore::new()),
            feed,
        }
    }

    pub fn directory(&self) -> &GuestDirectory {
        &self.directory
    }

    /// Replay every stored guest event into a fresh directory.
    pub fn rebuild_directory(&self) -> Result<usize, GuestError> {
        let envelopes = self
            .dispatcher
            .store()
            .load_all(GUEST_AGGREGATE_TYPE)?
            .iter()
            .map(StoredEvent::to_envelope)
            .collect::<Vec<_>>();

        let applied = self.directory.rebuild_from_scratch(envelopes)?;
        info!(events = applied, "guest directory rebuilt");
        Ok(applied)
    }

    pub fn register(&self, tenant_id: TenantId, input: NewGuest) -> Result<Guest, GuestError> {
        let guest_id = GuestId::new(AggregateId::new());
        self.execute(
            tenant_id,
            GuestCommand::RegisterGuest(RegisterGuest {
                tenant_id,
                guest_id,
                profile: input.profile,
                room_number: input.room_number,
                check_in_date: input.check_in_date,
                check_out_date: input.check_out_date,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Authoritative current state, rehydrated from the record store.
    pub fn get(&self, tenant_id: TenantId, guest_id: GuestId) -> Result<Guest, GuestError> {
        let guest = self
            .dispatcher
            .load(tenant_id, guest_id.0, |_, id| Guest::empty(GuestId::new(id)))?;
        if !guest.is_registered() {
            return Err(GuestError::NotFound);
        }
        Ok(guest)
    }

    pub fn stay_history(&self, tenant_id: TenantId, guest_id: GuestId) -> Result<Vec<StayRecord>, GuestError> {
        Ok(self.get(tenant_id, guest_id)?.stay_history().to_vec())
    }

    pub fn correct_profile(
        &self,
        tenant_id: TenantId,
        guest_id: GuestId,
        correction: ProfileCorrection,
    ) -> Result<Guest, GuestError> {
        self.execute(
            tenant_id,
            GuestCommand::CorrectProfile(CorrectProfile {
                tenant_id,
                guest_id,
                first_name: correction.first_name,
                last_name: correction.last_name,
                email: correction.email,
                phone: correction.phone,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn record_login(&self, tenant_id: TenantId, guest_id: GuestId, at: DateTime<Utc>) -> Result<Guest, GuestError> {
        self.execute(
            tenant_id,
            GuestCommand::RecordLogin(RecordLogin {
                tenant_id,
                guest_id,
                occurred_at: at,
            }),
        )
    }

    /// Check the guest out: archive the current stay and clear the room.
    pub fn deactivate(&self, tenant_id: TenantId, guest_id: GuestId) -> Result<Guest, GuestError> {
        self.execute(
            tenant_id,
            GuestCommand::DeactivateGuest(DeactivateGuest {
                tenant_id,
                guest_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Check an inactive guest in with a new room and date range.
    pub fn activate(
        &self,
        tenant_id: TenantId,
        guest_id: GuestId,
        room_number: String,
        check_in_date: NaiveDate,
        check_out_date: NaiveDate,
    ) -> Result<Guest, GuestError> {
        self.execute(
            tenant_id,
            GuestCommand::ActivateGuest(ActivateGuest {
                tenant_id,
                guest_id,
                room_number,
                check_in_date,
                check_out_date,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Edit the room and/or dates of an active stay in place.
    pub fn update_occupancy(
        &self,
        tenant_id: TenantId,
        guest_id: GuestId,
        change: OccupancyChange,
    ) -> Result<Guest, GuestError> {
        self.execute(
            tenant_id,
            GuestCommand::UpdateOccupancy(UpdateOccupancy {
                tenant_id,
                guest_id,
                room_number: change.room_number,
                check_in_date: change.check_in_date,
                check_out_date: change.check_out_date,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn enroll(&self, tenant_id: TenantId, guest_id: GuestId) -> Result<Guest, GuestError> {
        self.execute(
            tenant_id,
            GuestCommand::EnrollLoyalty(EnrollLoyalty {
                tenant_id,
                guest_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn unenroll(&self, tenant_id: TenantId, guest_id: GuestId) -> Result<Guest, GuestError> {
        self.execute(
            tenant_id,
            GuestCommand::UnenrollLoyalty(UnenrollLoyalty {
                tenant_id,
                guest_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn search(&self, tenant_id: TenantId, query: &DirectoryQuery) -> DirectoryPage {
        self.directory.search(tenant_id, query)
    }

    fn execute(&self, tenant_id: TenantId, command: GuestCommand) -> Result<Guest, GuestError> {
        let span = info_span!(
            "guest_command",
            command = command.name(),
            tenant_id = %tenant_id,
            guest_id = %command.guest_id(),
        );
        let _enter = span.enter();

        let aggregate_id = command.target_aggregate_id();
        let dispatched = self
            .dispatcher
            .dispatch(tenant_id, aggregate_id, GUEST_AGGREGATE_TYPE, command, |_, id| {
                Guest::empty(GuestId::new(id))
            })
            .map_err(|err| {
                let err = GuestError::from(err);
                match &err {
                    GuestError::StoreUnavailable(_) | GuestError::Internal(_) => {
                        warn!(error = %err, "guest command failed")
                    }
                    _ => debug!(error = %err, "guest command rejected"),
                }
                err
            })?;

        self.project();

        info!(
            events = dispatched.committed.len(),
            version = dispatched.aggregate.version(),
            "guest command applied"
        );
        Ok(dispatched.aggregate)
    }

    /// Drain published envelopes into the directory. The write is already
    /// durable, so projection trouble is logged, not returned.
    fn project(&self) {
        let feed = match self.feed.lock() {
            Ok(feed) => feed,
            Err(_) => {
                warn!("guest directory feed lock poisoned");
                return;
            }
        };
        while let Ok(envelope) = feed.try_recv() {
            match self.directory.apply_envelope(&envelope) {
                Ok(()) => {}
                Err(GuestDirectoryError::SequenceGap { .. }) => {
                    // A concurrent writer's events have not been applied yet.
                    self.catch_up(envelope.tenant_id(), envelope.aggregate_id());
                }
                Err(err) => warn!(error = %err, "guest directory apply failed"),
            }
        }
    }

    fn catch_up(&self, tenant_id: TenantId, aggregate_id: AggregateId) {
        let stream = match self.dispatcher.store().load_stream(tenant_id, aggregate_id) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "guest directory catch-up could not load stream");
                return;
            }
        };
        for stored in &stream {
            if let Err(err) = self.directory.apply_envelope(&stored.to_envelope()) {
                warn!(error = %err, "guest directory catch-up failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use staydesk_core::ExpectedVersion;
    use staydesk_events::InMemoryEventBus;
    use staydesk_guests::{Loyalty, LoyaltyTier, Occupancy, OccupancyStatus};
    use uuid::Uuid;

    use crate::event_store::{InMemoryEventStore, UncommittedEvent};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn service() -> GuestService<Arc<InMemoryEventStore>, Bus> {
        GuestService::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_guest(first: &str, last: &str, room: &str) -> NewGuest {
        NewGuest {
            profile: GuestProfile {
                first_name: first.to_string(),
                last_name: last.to_string(),
                email: format!("{}@example.com", first.to_lowercase()),
                phone: None,
            },
            room_number: room.to_string(),
            check_in_date: date(2025, 1, 1),
            check_out_date: date(2025, 1, 5),
        }
    }

    fn all(status: Option<OccupancyStatus>) -> DirectoryQuery {
        DirectoryQuery {
            status,
            page: 1,
            page_size: 50,
            ..DirectoryQuery::default()
        }
    }

    #[test]
    fn check_out_archives_stay_and_is_visible_in_directory() {
        let svc = service();
        let t = TenantId::new();
        let guest = svc.register(t, new_guest("Jane", "Doe", "12A")).unwrap();

        let out = svc.deactivate(t, guest.id_typed()).unwrap();
        assert_eq!(out.occupancy(), &Occupancy::Inactive);
        assert_eq!(out.stay_history().len(), 1);
        assert_eq!(out.stay_history()[0].number_of_nights, 4);

        let inactive = svc.search(t, &all(Some(OccupancyStatus::Inactive)));
        assert_eq!(inactive.total, 1);
        assert_eq!(inactive.items[0], out);
        assert_eq!(svc.get(t, guest.id_typed()).unwrap(), out);
    }

    #[test]
    fn second_deactivate_is_invalid_state_and_leaves_history() {
        let svc = service();
        let t = TenantId::new();
        let id = svc.register(t, new_guest("Jane", "Doe", "12A")).unwrap().id_typed();
        svc.deactivate(t, id).unwrap();

        let err = svc.deactivate(t, id).unwrap_err();
        assert!(matches!(err, GuestError::InvalidState(_)));
        assert_eq!(svc.stay_history(t, id).unwrap().len(), 1);
    }

    #[test]
    fn activate_and_update_occupancy_paths() {
        let svc = service();
        let t = TenantId::new();
        let id = svc.register(t, new_guest("Jane", "Doe", "12A")).unwrap().id_typed();

        let moved = svc
            .update_occupancy(
                t,
                id,
                OccupancyChange {
                    room_number: Some("12B".to_string()),
                    ..OccupancyChange::default()
                },
            )
            .unwrap();
        assert_eq!(moved.occupancy().room_number(), Some("12B"));
        assert!(moved.stay_history().is_empty());

        svc.deactivate(t, id).unwrap();
        let err = svc
            .update_occupancy(
                t,
                id,
                OccupancyChange {
                    room_number: Some("1".to_string()),
                    ..OccupancyChange::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, GuestError::InvalidState(_)));

        let err = svc
            .activate(t, id, "101".to_string(), date(2025, 1, 5), date(2025, 1, 1))
            .unwrap_err();
        assert!(matches!(err, GuestError::Validation(_)));

        let back = svc
            .activate(t, id, "205".to_string(), date(2025, 3, 1), date(2025, 3, 4))
            .unwrap();
        assert!(back.is_active());
        assert_eq!(back.stay_history().len(), 1);
    }

    #[test]
    fn loyalty_round_trip_resets_to_bronze() {
        let svc = service();
        let t = TenantId::new();
        let id = svc.register(t, new_guest("Jane", "Doe", "12A")).unwrap().id_typed();

        assert_eq!(
            svc.enroll(t, id).unwrap().loyalty(),
            &Loyalty::Enrolled {
                tier: LoyaltyTier::Bronze,
                points: 0,
                available_points: 0
            }
        );
        assert!(matches!(svc.enroll(t, id).unwrap_err(), GuestError::InvalidState(_)));
        assert_eq!(svc.unenroll(t, id).unwrap().loyalty(), &Loyalty::NotEnrolled);
        assert!(matches!(svc.unenroll(t, id).unwrap_err(), GuestError::InvalidState(_)));
        assert_eq!(svc.enroll(t, id).unwrap().loyalty(), &Loyalty::fresh_enrollment());
    }

    #[test]
    fn unknown_guest_is_not_found_everywhere() {
        let svc = service();
        let t = TenantId::new();
        let id = GuestId::new(AggregateId::new());

        assert_eq!(svc.get(t, id).unwrap_err(), GuestError::NotFound);
        assert_eq!(svc.deactivate(t, id).unwrap_err(), GuestError::NotFound);
        assert_eq!(svc.enroll(t, id).unwrap_err(), GuestError::NotFound);
        assert_eq!(svc.record_login(t, id, Utc::now()).unwrap_err(), GuestError::NotFound);
    }

    #[test]
    fn guests_are_invisible_across_hotels() {
        let svc = service();
        let (a, b) = (TenantId::new(), TenantId::new());
        let id = svc.register(a, new_guest("Jane", "Doe", "12A")).unwrap().id_typed();

        assert_eq!(svc.get(b, id).unwrap_err(), GuestError::NotFound);
        assert_eq!(svc.deactivate(b, id).unwrap_err(), GuestError::NotFound);
        assert_eq!(svc.search(b, &all(None)).total, 0);
        assert!(svc.get(a, id).unwrap().is_active());
    }

    #[test]
    fn profile_correction_and_login_are_reflected() {
        let svc = service();
        let t = TenantId::new();
        let id = svc.register(t, new_guest("Jane", "Doe", "12A")).unwrap().id_typed();

        let corrected = svc
            .correct_profile(
                t,
                id,
                ProfileCorrection {
                    last_name: Some("Smith".to_string()),
                    ..ProfileCorrection::default()
                },
            )
            .unwrap();
        assert_eq!(corrected.profile().full_name(), "Jane Smith");

        let at = Utc::now();
        assert_eq!(svc.record_login(t, id, at).unwrap().last_login(), Some(at));

        let hits = svc.search(
            t,
            &DirectoryQuery {
                text: Some("smith".to_string()),
                ..all(None)
            },
        );
        assert_eq!(hits.total, 1);
    }

    #[test]
    fn register_validation_errors() {
        let svc = service();
        let t = TenantId::new();

        let mut bad_room = new_guest("Jane", "Doe", "  ");
        assert!(matches!(svc.register(t, bad_room.clone()).unwrap_err(), GuestError::Validation(_)));

        bad_room.room_number = "12A".to_string();
        bad_room.profile.email = "nope".to_string();
        assert!(matches!(svc.register(t, bad_room).unwrap_err(), GuestError::Validation(_)));

        assert_eq!(svc.search(t, &all(None)).total, 0);
    }

    /// Store that lets one rival writer in between a command's load and append.
    struct RacingStore {
        inner: InMemoryEventStore,
        race_next_append: AtomicBool,
    }

    impl EventStore for RacingStore {
        fn append(
            &self,
            events: Vec<UncommittedEvent>,
            expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            if self.race_next_append.swap(false, Ordering::SeqCst) {
                let mut rival = events[0].clone();
                rival.event_id = Uuid::now_v7();
                self.inner.append(vec![rival], ExpectedVersion::Any)?;
            }
            self.inner.append(events, expected_version)
        }

        fn load_stream(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.load_stream(tenant_id, aggregate_id)
        }

        fn load_all(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.load_all(aggregate_type)
        }
    }

    #[test]
    fn losing_a_race_is_a_conflict_and_writes_nothing() {
        let store = Arc::new(RacingStore {
            inner: InMemoryEventStore::new(),
            race_next_append: AtomicBool::new(false),
        });
        let svc = GuestService::new(store.clone(), Bus::default());
        let t = TenantId::new();
        let id = svc.register(t, new_guest("Jane", "Doe", "12A")).unwrap().id_typed();

        store.race_next_append.store(true, Ordering::SeqCst);
        let err = svc.enroll(t, id).unwrap_err();
        assert!(matches!(err, GuestError::Conflict(_)));

        // Registration plus the rival's event; the losing command added nothing.
        assert_eq!(store.load_stream(t, id.0).unwrap().len(), 2);
    }

    struct DownStore;

    impl EventStore for DownStore {
        fn append(&self, _: Vec<UncommittedEvent>, _: ExpectedVersion) -> Result<Vec<StoredEvent>, EventStoreError> {
            Err(EventStoreError::Unavailable("connection refused".to_string()))
        }

        fn load_stream(&self, _: TenantId, _: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
            Err(EventStoreError::Unavailable("connection refused".to_string()))
        }

        fn load_all(&self, _: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
            Err(EventStoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn unreachable_store_is_store_unavailable() {
        let svc = GuestService::new(DownStore, Bus::default());
        let t = TenantId::new();

        assert!(matches!(
            svc.register(t, new_guest("Jane", "Doe", "12A")).unwrap_err(),
            GuestError::StoreUnavailable(_)
        ));
        assert!(matches!(
            svc.get(t, GuestId::new(AggregateId::new())).unwrap_err(),
            GuestError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn rebuild_directory_restores_rows_from_the_store() {
        let store = Arc::new(InMemoryEventStore::new());
        let t = TenantId::new();
        let first = GuestService::new(store.clone(), Bus::default());
        let a = first.register(t, new_guest("Ann", "Able", "1")).unwrap().id_typed();
        first.register(t, new_guest("Ben", "Baker", "2")).unwrap();
        first.deactivate(t, a).unwrap();

        // A fresh process over the same store starts with an empty directory.
        let second = GuestService::new(store, Bus::default());
        assert_eq!(second.search(t, &all(None)).total, 0);

        assert_eq!(second.rebuild_directory().unwrap(), 3);
        let page = second.search(t, &all(None));
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].profile().first_name, "Ann");
        assert!(!page.items[0].is_active());
    }

    #[test]
    fn directory_catches_up_when_a_concurrent_write_was_not_yet_applied() {
        let store = Arc::new(InMemoryEventStore::new());
        let t = TenantId::new();
        let writer = GuestService::new(store.clone(), Bus::default());
        let id = writer.register(t, new_guest("Jane", "Doe", "12A")).unwrap().id_typed();

        // A second service instance over the same store stands in for a writer
        // whose projection step has not run in this process.
        let other = GuestService::new(store.clone(), Bus::default());
        other.enroll(t, id).unwrap();

        let out = writer.deactivate(t, id).unwrap();
        let row = writer.directory().get(t, &id).unwrap();
        assert_eq!(row, out);
        assert!(row.loyalty().is_enrolled());
    }

    #[test]
    fn services_sharing_a_bus_project_each_others_writes() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Bus::default();
        let t = TenantId::new();
        let front_desk = GuestService::new(store.clone(), bus.clone());
        let back_office = GuestService::new(store, bus);

        front_desk.register(t, new_guest("Jane", "Doe", "12A")).unwrap();
        back_office.register(t, new_guest("Bob", "Ray", "14B")).unwrap();

        // Back office drained Jane's envelope from the bus before its own.
        let page = back_office.search(t, &all(None));
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].profile().first_name, "Jane");
    }
}
