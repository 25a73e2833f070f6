use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use staydesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use staydesk_events::{Command, Event};

use crate::loyalty::{Loyalty, LoyaltyTier};
use crate::occupancy::{Occupancy, StayRecord, normalize_room_number, validate_stay_dates};
use crate::profile::GuestProfile;

/// Stream type for guest aggregates in the event store.
pub const GUEST_AGGREGATE_TYPE: &str = "guests.guest";

/// Guest identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(pub AggregateId);

impl GuestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for GuestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for GuestId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Aggregate root: a guest's occupancy, stay history and loyalty membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guest {
    id: GuestId,
    tenant_id: Option<TenantId>,
    profile: GuestProfile,
    occupancy: Occupancy,
    stay_history: Vec<StayRecord>,
    loyalty: Loyalty,
    created_at: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Guest {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: GuestId) -> Self {
        Self {
            id,
            tenant_id: None,
            profile: GuestProfile::default(),
            occupancy: Occupancy::Inactive,
            stay_history: Vec::new(),
            loyalty: Loyalty::NotEnrolled,
            created_at: None,
            last_login: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> GuestId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    pub fn profile(&self) -> &GuestProfile {
        &self.profile
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    /// Past stays, oldest first.
    pub fn stay_history(&self) -> &[StayRecord] {
        &self.stay_history
    }

    pub fn loyalty(&self) -> &Loyalty {
        &self.loyalty
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }

    pub fn is_active(&self) -> bool {
        self.occupancy.is_active()
    }
}

impl AggregateRoot for Guest {
    type Id = GuestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterGuest (first registration, usually from the QR flow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterGuest {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub profile: GuestProfile,
    pub room_number: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CorrectProfile (admin correction; `None` keeps the current value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectProfile {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// `Some("")` clears the phone number.
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordLogin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLogin {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateGuest (check-out; archives the live occupancy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateGuest {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateGuest (check-in with a fresh room and date range).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateGuest {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub room_number: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateOccupancy (in-place edit of an active stay).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOccupancy {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub room_number: Option<String>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EnrollLoyalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollLoyalty {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UnenrollLoyalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnenrollLoyalty {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestCommand {
    RegisterGuest(RegisterGuest),
    CorrectProfile(CorrectProfile),
    RecordLogin(RecordLogin),
    DeactivateGuest(DeactivateGuest),
    ActivateGuest(ActivateGuest),
    UpdateOccupancy(UpdateOccupancy),
    EnrollLoyalty(EnrollLoyalty),
    UnenrollLoyalty(UnenrollLoyalty),
}

impl GuestCommand {
    pub fn guest_id(&self) -> GuestId {
        match self {
            GuestCommand::RegisterGuest(c) => c.guest_id,
            GuestCommand::CorrectProfile(c) => c.guest_id,
            GuestCommand::RecordLogin(c) => c.guest_id,
            GuestCommand::DeactivateGuest(c) => c.guest_id,
            GuestCommand::ActivateGuest(c) => c.guest_id,
            GuestCommand::UpdateOccupancy(c) => c.guest_id,
            GuestCommand::EnrollLoyalty(c) => c.guest_id,
            GuestCommand::UnenrollLoyalty(c) => c.guest_id,
        }
    }

    /// Short name used in logs and spans.
    pub fn name(&self) -> &'static str {
        match self {
            GuestCommand::RegisterGuest(_) => "register",
            GuestCommand::CorrectProfile(_) => "correct_profile",
            GuestCommand::RecordLogin(_) => "record_login",
            GuestCommand::DeactivateGuest(_) => "deactivate",
            GuestCommand::ActivateGuest(_) => "activate",
            GuestCommand::UpdateOccupancy(_) => "update_occupancy",
            GuestCommand::EnrollLoyalty(_) => "enroll_loyalty",
            GuestCommand::UnenrollLoyalty(_) => "unenroll_loyalty",
        }
    }
}

impl Command for GuestCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.guest_id().0
    }
}

/// Event: GuestRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRegistered {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub profile: GuestProfile,
    pub occupancy: Occupancy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GuestProfileCorrected (carries the full corrected profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestProfileCorrected {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub profile: GuestProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GuestLoggedIn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestLoggedIn {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GuestDeactivated.
///
/// Archival and the occupancy clear are one fact: applying this event appends
/// `stay` to the history and leaves the guest inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDeactivated {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub stay: StayRecord,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GuestActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestActivated {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub room_number: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OccupancyUpdated (carries the merged occupancy, not a diff).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyUpdated {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub room_number: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoyaltyEnrolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyEnrolled {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub tier: LoyaltyTier,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoyaltyUnenrolled.
///
/// The `discarded_*` fields record what the membership held for audit; they
/// are never applied back onto a later enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyUnenrolled {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub discarded_tier: LoyaltyTier,
    pub discarded_points: u64,
    pub discarded_available_points: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestEvent {
    GuestRegistered(GuestRegistered),
    GuestProfileCorrected(GuestProfileCorrected),
    GuestLoggedIn(GuestLoggedIn),
    GuestDeactivated(GuestDeactivated),
    GuestActivated(GuestActivated),
    OccupancyUpdated(OccupancyUpdated),
    LoyaltyEnrolled(LoyaltyEnrolled),
    LoyaltyUnenrolled(LoyaltyUnenrolled),
}

impl GuestEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            GuestEvent::GuestRegistered(e) => e.tenant_id,
            GuestEvent::GuestProfileCorrected(e) => e.tenant_id,
            GuestEvent::GuestLoggedIn(e) => e.tenant_id,
            GuestEvent::GuestDeactivated(e) => e.tenant_id,
            GuestEvent::GuestActivated(e) => e.tenant_id,
            GuestEvent::OccupancyUpdated(e) => e.tenant_id,
            GuestEvent::LoyaltyEnrolled(e) => e.tenant_id,
            GuestEvent::LoyaltyUnenrolled(e) => e.tenant_id,
        }
    }

    pub fn guest_id(&self) -> GuestId {
        match self {
            GuestEvent::GuestRegistered(e) => e.guest_id,
            GuestEvent::GuestProfileCorrected(e) => e.guest_id,
            GuestEvent::GuestLoggedIn(e) => e.guest_id,
            GuestEvent::GuestDeactivated(e) => e.guest_id,
            GuestEvent::GuestActivated(e) => e.guest_id,
            GuestEvent::OccupancyUpdated(e) => e.guest_id,
            GuestEvent::LoyaltyEnrolled(e) => e.guest_id,
            GuestEvent::LoyaltyUnenrolled(e) => e.guest_id,
        }
    }
}

impl Event for GuestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GuestEvent::GuestRegistered(_) => "guests.guest.registered",
            GuestEvent::GuestProfileCorrected(_) => "guests.guest.profile_corrected",
            GuestEvent::GuestLoggedIn(_) => "guests.guest.logged_in",
            GuestEvent::GuestDeactivated(_) => "guests.guest.deactivated",
            GuestEvent::GuestActivated(_) => "guests.guest.activated",
            GuestEvent::OccupancyUpdated(_) => "guests.guest.occupancy_updated",
            GuestEvent::LoyaltyEnrolled(_) => "guests.guest.loyalty_enrolled",
            GuestEvent::LoyaltyUnenrolled(_) => "guests.guest.loyalty_unenrolled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GuestEvent::GuestRegistered(e) => e.occurred_at,
            GuestEvent::GuestProfileCorrected(e) => e.occurred_at,
            GuestEvent::GuestLoggedIn(e) => e.occurred_at,
            GuestEvent::GuestDeactivated(e) => e.occurred_at,
            GuestEvent::GuestActivated(e) => e.occurred_at,
            GuestEvent::OccupancyUpdated(e) => e.occurred_at,
            GuestEvent::LoyaltyEnrolled(e) => e.occurred_at,
            GuestEvent::LoyaltyUnenrolled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Guest {
    type Command = GuestCommand;
    type Event = GuestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GuestEvent::GuestRegistered(e) => {
                self.id = e.guest_id;
                self.tenant_id = Some(e.tenant_id);
                self.profile = e.profile.clone();
                self.occupancy = e.occupancy.clone();
                self.stay_history.clear();
                self.loyalty = Loyalty::NotEnrolled;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            GuestEvent::GuestProfileCorrected(e) => {
                self.profile = e.profile.clone();
            }
            GuestEvent::GuestLoggedIn(e) => {
                self.last_login = Some(e.occurred_at);
            }
            GuestEvent::GuestDeactivated(e) => {
                self.stay_history.push(e.stay.clone());
                self.occupancy = Occupancy::Inactive;
            }
            GuestEvent::GuestActivated(GuestActivated {
                room_number,
                check_in_date,
                check_out_date,
                ..
            })
            | GuestEvent::OccupancyUpdated(OccupancyUpdated {
                room_number,
                check_in_date,
                check_out_date,
                ..
            }) => {
                self.occupancy = Occupancy::Active {
                    room_number: room_number.clone(),
                    check_in_date: *check_in_date,
                    check_out_date: *check_out_date,
                };
            }
            GuestEvent::LoyaltyEnrolled(e) => {
                self.loyalty = Loyalty::Enrolled {
                    tier: e.tier,
                    points: 0,
                    available_points: 0,
                };
            }
            GuestEvent::LoyaltyUnenrolled(_) => {
                self.loyalty = Loyalty::NotEnrolled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GuestCommand::RegisterGuest(cmd) => self.handle_register(cmd),
            GuestCommand::CorrectProfile(cmd) => self.handle_correct_profile(cmd),
            GuestCommand::RecordLogin(cmd) => self.handle_record_login(cmd),
            GuestCommand::DeactivateGuest(cmd) => self.handle_deactivate(cmd),
            GuestCommand::ActivateGuest(cmd) => self.handle_activate(cmd),
            GuestCommand::UpdateOccupancy(cmd) => self.handle_update_occupancy(cmd),
            GuestCommand::EnrollLoyalty(cmd) => self.handle_enroll(cmd),
            GuestCommand::UnenrollLoyalty(cmd) => self.handle_unenroll(cmd),
        }
    }
}

impl Guest {
    /// Every command except registration targets an existing guest of the same
    /// tenant and stream.
    fn ensure_registered(&self, tenant_id: TenantId, guest_id: GuestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != guest_id {
            return Err(DomainError::invariant("guest_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterGuest) -> Result<Vec<GuestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invalid_state("guest is already registered"));
        }

        let profile = cmd.profile.clone().normalized()?;
        let occupancy = Occupancy::active(&cmd.room_number, cmd.check_in_date, cmd.check_out_date)?;

        Ok(vec![GuestEvent::GuestRegistered(GuestRegistered {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            profile,
            occupancy,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_correct_profile(&self, cmd: &CorrectProfile) -> Result<Vec<GuestEvent>, DomainError> {
        self.ensure_registered(cmd.tenant_id, cmd.guest_id)?;

        let current = &self.profile;
        let corrected = GuestProfile {
            first_name: cmd.first_name.clone().unwrap_or_else(|| current.first_name.clone()),
            last_name: cmd.last_name.clone().unwrap_or_else(|| current.last_name.clone()),
            email: cmd.email.clone().unwrap_or_else(|| current.email.clone()),
            phone: match &cmd.phone {
                Some(p) => Some(p.clone()),
                None => current.phone.clone(),
            },
        }
        .normalized()?;

        if &corrected == current {
            return Ok(vec![]);
        }

        Ok(vec![GuestEvent::GuestProfileCorrected(GuestProfileCorrected {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            profile: corrected,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_login(&self, cmd: &RecordLogin) -> Result<Vec<GuestEvent>, DomainError> {
        self.ensure_registered(cmd.tenant_id, cmd.guest_id)?;

        Ok(vec![GuestEvent::GuestLoggedIn(GuestLoggedIn {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateGuest) -> Result<Vec<GuestEvent>, DomainError> {
        self.ensure_registered(cmd.tenant_id, cmd.guest_id)?;

        let stay = self
            .occupancy
            .to_stay_record()
            .ok_or_else(|| DomainError::invalid_state("guest is already inactive"))?;

        Ok(vec![GuestEvent::GuestDeactivated(GuestDeactivated {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            stay,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateGuest) -> Result<Vec<GuestEvent>, DomainError> {
        self.ensure_registered(cmd.tenant_id, cmd.guest_id)?;

        let room_number = normalize_room_number(&cmd.room_number)?;
        validate_stay_dates(cmd.check_in_date, cmd.check_out_date)?;

        if self.occupancy.is_active() {
            return Err(DomainError::invalid_state(
                "guest is already active; edit the current stay instead",
            ));
        }

        Ok(vec![GuestEvent::GuestActivated(GuestActivated {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            room_number,
            check_in_date: cmd.check_in_date,
            check_out_date: cmd.check_out_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_occupancy(&self, cmd: &UpdateOccupancy) -> Result<Vec<GuestEvent>, DomainError> {
        self.ensure_registered(cmd.tenant_id, cmd.guest_id)?;

        let Occupancy::Active {
            room_number,
            check_in_date,
            check_out_date,
        } = &self.occupancy
        else {
            return Err(DomainError::invalid_state(
                "guest is inactive; activate with a new stay to assign a room",
            ));
        };

        let new_room = match &cmd.room_number {
            Some(r) => normalize_room_number(r)?,
            None => room_number.clone(),
        };
        let new_check_in = cmd.check_in_date.unwrap_or(*check_in_date);
        let new_check_out = cmd.check_out_date.unwrap_or(*check_out_date);
        validate_stay_dates(new_check_in, new_check_out)?;

        if &new_room == room_number && new_check_in == *check_in_date && new_check_out == *check_out_date {
            return Ok(vec![]);
        }

        Ok(vec![GuestEvent::OccupancyUpdated(OccupancyUpdated {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            room_number: new_room,
            check_in_date: new_check_in,
            check_out_date: new_check_out,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_enroll(&self, cmd: &EnrollLoyalty) -> Result<Vec<GuestEvent>, DomainError> {
        self.ensure_registered(cmd.tenant_id, cmd.guest_id)?;

        if self.loyalty.is_enrolled() {
            return Err(DomainError::invalid_state(
                "guest is already enrolled in the loyalty program",
            ));
        }

        Ok(vec![GuestEvent::LoyaltyEnrolled(LoyaltyEnrolled {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            tier: LoyaltyTier::Bronze,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_unenroll(&self, cmd: &UnenrollLoyalty) -> Result<Vec<GuestEvent>, DomainError> {
        self.ensure_registered(cmd.tenant_id, cmd.guest_id)?;

        let Loyalty::Enrolled {
            tier,
            points,
            available_points,
        } = self.loyalty
        else {
            return Err(DomainError::invalid_state(
                "guest is not enrolled in the loyalty program",
            ));
        };

        Ok(vec![GuestEvent::LoyaltyUnenrolled(LoyaltyUnenrolled {
            tenant_id: cmd.tenant_id,
            guest_id: cmd.guest_id,
            discarded_tier: tier,
            discarded_points: points,
            discarded_available_points: available_points,
            occurred_at: cmd.occurred_at,
        })])
    }
}
