use std::sync::{Arc, Mutex};

use axum::response::Response;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::auth::{AuthenticatedUser, TokenAuthority};
use crate::workflows::grants::domain::{
    Application, ApplicationId, ApplicationMutation, ApplicationNumber, NumberingScope, UserId,
};
use crate::workflows::grants::repository::{
    ApplicationQuery, ApplicationRepository, RepositoryError, UpdateGuard, UserAccount, UserRole,
};
use crate::workflows::grants::validation::{validate_creation, validate_review};
use crate::workflows::grants::{
    grants_router, Clock, GrantApplicationService, GrantsState, InMemoryApplicationStore,
    InMemoryUserDirectory, MailError, Mailer, ManualClock, NotificationDispatcher,
    NotificationWorker, OutboundEmail,
};

pub(super) const APPLICANT: &str = "user-amina";
pub(super) const OTHER_APPLICANT: &str = "user-bola";
pub(super) const ADMIN: &str = "admin-chidi";
pub(super) const SUPER_ADMIN: &str = "admin-root";
pub(super) const TOKEN_SECRET: &str = "grants-test-secret";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap()
}

pub(super) fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn accounts() -> Vec<UserAccount> {
    vec![
        UserAccount {
            id: user(APPLICANT),
            email: "amina@example.org".to_string(),
            role: UserRole::User,
            is_active: true,
            email_verified: true,
        },
        UserAccount {
            id: user(OTHER_APPLICANT),
            email: "bola@example.org".to_string(),
            role: UserRole::User,
            is_active: true,
            email_verified: false,
        },
        UserAccount {
            id: user(ADMIN),
            email: "chidi@grants.example.org".to_string(),
            role: UserRole::Admin,
            is_active: true,
            email_verified: true,
        },
        UserAccount {
            id: user(SUPER_ADMIN),
            email: "root@grants.example.org".to_string(),
            role: UserRole::SuperAdmin,
            is_active: true,
            email_verified: true,
        },
    ]
}

#[derive(Debug, Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingMailer {
    pub(super) fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("mailer lock").clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        self.sent.lock().expect("mailer lock").push(email.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(super) struct FailingMailer;

impl Mailer for FailingMailer {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        Err(MailError::Rejected {
            recipient: email.to.clone(),
            reason: "mailbox full".to_string(),
        })
    }
}

/// Store whose every call fails, for exercising the 500 path.
pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _application: Application) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".into()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".into()))
    }

    fn fetch_by_number(
        &self,
        _number: &ApplicationNumber,
    ) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".into()))
    }

    fn apply(
        &self,
        _id: &ApplicationId,
        _guard: &UpdateGuard,
        _mutation: ApplicationMutation,
    ) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".into()))
    }

    fn apply_many(
        &self,
        _ids: &[ApplicationId],
        _mutation: &ApplicationMutation,
    ) -> Result<usize, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".into()))
    }

    fn query(&self, _query: &ApplicationQuery) -> Result<Vec<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".into()))
    }

    fn next_sequence(&self, _scope: &NumberingScope) -> Result<u32, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".into()))
    }
}

pub(super) type Service = GrantApplicationService<InMemoryApplicationStore, InMemoryUserDirectory>;

pub(super) struct Harness<M> {
    pub(super) service: Arc<Service>,
    pub(super) store: Arc<InMemoryApplicationStore>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) mailer: Arc<M>,
    pub(super) worker: NotificationWorker<InMemoryUserDirectory, M>,
}

pub(super) fn harness() -> Harness<RecordingMailer> {
    harness_with(RecordingMailer::default())
}

pub(super) fn harness_with<M: Mailer + 'static>(mailer: M) -> Harness<M> {
    let store = Arc::new(InMemoryApplicationStore::new());
    let users = Arc::new(InMemoryUserDirectory::with_users(accounts()));
    let clock = Arc::new(ManualClock::new(now()));
    let mailer = Arc::new(mailer);
    let (dispatcher, worker) = NotificationDispatcher::channel(users.clone(), mailer.clone());
    let service = Arc::new(GrantApplicationService::with_clock(
        store.clone(),
        users,
        dispatcher,
        clock.clone(),
    ));
    Harness {
        service,
        store,
        clock,
        mailer,
        worker,
    }
}

impl<M: Mailer + 'static> Harness<M> {
    pub(super) fn submit(&self, payload: Value) -> Application {
        let submission = validate_creation(&payload, self.clock.now())
            .expect("payload validates");
        self.service
            .submit(&user(APPLICANT), submission)
            .expect("submission stored")
    }

    pub(super) fn review(&self, application: &Application, payload: Value) -> Application {
        let decision =
            validate_review(&payload, self.clock.now()).expect("review validates");
        self.service
            .review(&application.id, &user(ADMIN), decision)
            .expect("review stored")
    }

    pub(super) fn router(&self) -> Router {
        grants_router(GrantsState {
            service: self.service.clone(),
            auth: Arc::new(TokenAuthority::new(TOKEN_SECRET, 1)),
        })
    }
}

pub(super) fn bearer(id: &str, role: UserRole) -> String {
    let token = TokenAuthority::new(TOKEN_SECRET, 1)
        .issue(&AuthenticatedUser {
            id: user(id),
            email: format!("{id}@example.org"),
            role,
        })
        .expect("token issued");
    format!("Bearer {token}")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn academic_info() -> Value {
    json!({
        "schoolName": "Unity Model College",
        "schoolAddress": "12 Ring Road, Ibadan",
        "studentClass": "JSS 2",
        "academicYear": "2025/2026",
        "schoolEmail": "bursar@unitycollege.edu.ng"
    })
}

pub(super) fn financial_info(amount: f64) -> Value {
    json!({
        "requestedAmount": amount,
        "currency": "NGN",
        "breakdown": [
            { "item": "Tuition", "amount": amount * 0.8 },
            { "item": "Books", "amount": amount * 0.2, "description": "Core texts" }
        ],
        "numberOfDependents": 3
    })
}

pub(super) fn school_fees_payload() -> Value {
    json!({
        "applicationType": "SCHOOL_FEES",
        "title": "Second term school fees",
        "description": "Support to cover tuition for the second term.",
        "financialInfo": financial_info(50000.0),
        "academicInfo": academic_info(),
        "guardianInfo": {
            "guardianName": "Kemi Adeyemi",
            "relationship": "Mother",
            "guardianPhone": "+2348000000000",
            "guardianEmail": "kemi@example.org",
            "monthlyIncome": 45000
        },
        "supportingDocuments": [
            {
                "documentType": "fee_invoice",
                "documentUrl": "https://files.example.org/invoice.pdf",
                "documentName": "invoice.pdf"
            }
        ],
        "tags": ["returning"]
    })
}

pub(super) fn school_support_payload() -> Value {
    json!({
        "applicationType": "SCHOOL_SUPPORT",
        "title": "Feeding programme",
        "description": "Lunch for boarding students for one term.",
        "priority": "HIGH",
        "financialInfo": financial_info(320000.0),
        "academicInfo": academic_info(),
        "schoolSupportData": {
            "supportType": ["feeding", "books"],
            "numberOfStudents": 40,
            "durationNeeded": "One term",
            "specificNeeds": "Daily lunch and reading books",
            "preferredStartDate": "2025-11-03"
        }
    })
}

pub(super) fn orphanage_payload() -> Value {
    json!({
        "applicationType": "ORPHANAGE_DONATION",
        "title": "Clinic supplies",
        "description": "Medical supplies and food for the home.",
        "priority": "URGENT",
        "urgencyReason": "Malaria outbreak",
        "financialInfo": financial_info(750000.0),
        "orphanageData": {
            "orphanageName": "Hope Children's Home",
            "registrationNumber": "CAC-IT-22871",
            "directorName": "Grace Okafor",
            "numberOfChildren": 28,
            "ageRange": "3-16",
            "operationalNeeds": ["medical", "food"],
            "monthlyOperatingCost": 0,
            "staffCount": 6,
            "facilityDescription": "Two-storey building with a small clinic room"
        }
    })
}
