//! Fixtures for service tests: an in-memory store on a fixed clock

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{
    AccessGrant, CalendarEvent, Case, CaseStatus, CaseType, ClientRole, CourtInstance, EventType,
    GrantLevel, NewCase, NewEvent, NewGrant,
};
use crate::database::MemoryStore;
use crate::services::{
    AccessService, CalendarService, CaseService, Clock, FixedClock, InvitationService,
    NotificationService, PostponementService,
};
use crate::state::AppState;

pub struct Fixture {
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub owner: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let state = AppState::new(Arc::new(MemoryStore::new()), clock.clone());
        Self { state, clock, owner: Uuid::new_v4() }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn access(&self) -> AccessService {
        AccessService::new(&self.state)
    }

    pub fn postponement(&self) -> PostponementService {
        PostponementService::new(&self.state)
    }

    pub fn calendar(&self) -> CalendarService {
        CalendarService::new(&self.state)
    }

    pub fn cases(&self) -> CaseService {
        CaseService::new(&self.state)
    }

    pub fn invitations(&self) -> InvitationService {
        InvitationService::new(&self.state)
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(&self.state)
    }

    pub fn new_case() -> NewCase {
        NewCase {
            court_id: Uuid::new_v4(),
            case_number: format!("A40-{}/2025", &Uuid::new_v4().simple().to_string()[..6]),
            case_type: CaseType::Civil,
            court_instance: CourtInstance::First,
            subject_matter: "Recovery of debt under supply contract".into(),
            claim_amount: None,
            status: CaseStatus::Accepted,
            received_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            judge_name: "Petrova".into(),
            plaintiff: "Alfa LLC".into(),
            defendant: "Beta JSC".into(),
            third_party: String::new(),
            client_role: ClientRole::Plaintiff,
            subcategory: String::new(),
            description: String::new(),
            notes: String::new(),
        }
    }

    pub async fn case(&self, owner: Uuid) -> Case {
        let case = Self::new_case().into_case(owner, self.now());
        self.state.store.insert_case(&case).await.unwrap();
        case
    }

    pub async fn grant(&self, case: &Case, user: Uuid, level: GrantLevel) -> AccessGrant {
        let grant = NewGrant {
            case_id: case.id,
            user_id: user,
            access_level: level,
            granted_by: case.owner_id,
            granted_at: self.now(),
        }
        .into_grant();
        self.state.store.insert_grant(&grant).await.unwrap();
        grant
    }

    pub fn new_event(case: &Case, start: DateTime<Utc>) -> NewEvent {
        NewEvent {
            case_id: case.id,
            dispute_id: None,
            event_type: EventType::Hearing,
            title: "Court hearing".into(),
            description: String::new(),
            start_datetime: start,
            end_datetime: Some(start + Duration::hours(1)),
            courtroom: "412".into(),
            court_address: String::new(),
            participants: String::new(),
            agenda: String::new(),
            email_notifications: true,
            telegram_notifications: false,
        }
    }

    /// Scheduled hearing `starts_in` from now, written straight to the store
    pub async fn event(&self, case: &Case, creator: Uuid, starts_in: Duration) -> CalendarEvent {
        let event = Self::new_event(case, self.now() + starts_in).into_event(creator, self.now());
        self.state.store.insert_event(&event).await.unwrap();
        event
    }
}
