use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationMutation, ApplicationNumber, ApplicationStatus,
    ApplicationType, NumberingScope, Priority, UserId,
};

/// Storage abstraction so the lifecycle service can be exercised in isolation.
///
/// Every method is a single atomic operation against the store. Implementations must apply an
/// [`ApplicationMutation`] and check its [`UpdateGuard`] under the same write, and must hand out
/// sequence values without gaps being reused.
pub trait ApplicationRepository: Send + Sync {
    /// Persist a new record. Fails with `Conflict` when the id or number is already taken.
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;

    /// Fetch a live (not soft-deleted) record.
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;

    fn fetch_by_number(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Option<Application>, RepositoryError>;

    /// Apply `mutation` to a live record if `guard` holds, returning the updated record.
    fn apply(
        &self,
        id: &ApplicationId,
        guard: &UpdateGuard,
        mutation: ApplicationMutation,
    ) -> Result<Application, RepositoryError>;

    /// Apply the same mutation to every live record in `ids`, returning how many changed.
    fn apply_many(
        &self,
        ids: &[ApplicationId],
        mutation: &ApplicationMutation,
    ) -> Result<usize, RepositoryError>;

    /// Live records matching `query`, newest submission first.
    fn query(&self, query: &ApplicationQuery) -> Result<Vec<Application>, RepositoryError>;

    /// Atomically increment and return the counter for `scope`, starting at 1.
    fn next_sequence(&self, scope: &NumberingScope) -> Result<u32, RepositoryError>;
}

/// Preconditions checked atomically with an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateGuard {
    pub applicant: Option<UserId>,
    pub statuses: Option<Vec<ApplicationStatus>>,
}

impl UpdateGuard {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn owned_by(applicant: UserId) -> Self {
        Self {
            applicant: Some(applicant),
            statuses: None,
        }
    }

    pub fn in_statuses(mut self, statuses: &[ApplicationStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn check(&self, application: &Application) -> Result<(), RepositoryError> {
        if let Some(applicant) = &self.applicant {
            if !application.is_owned_by(applicant) {
                return Err(RepositoryError::PreconditionFailed(
                    "applicant does not own the application".to_string(),
                ));
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&application.status) {
                return Err(RepositoryError::PreconditionFailed(format!(
                    "status is {}",
                    application.status
                )));
            }
        }
        Ok(())
    }
}

/// Filter over live records. Empty vectors mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationQuery {
    pub applicant_id: Option<UserId>,
    pub statuses: Vec<ApplicationStatus>,
    pub types: Vec<ApplicationType>,
    pub priorities: Vec<Priority>,
    pub assigned_to: Option<UserId>,
    pub submitted_from: Option<DateTime<Utc>>,
    pub submitted_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl ApplicationQuery {
    pub fn matches(&self, application: &Application) -> bool {
        if application.is_deleted {
            return false;
        }
        if let Some(applicant) = &self.applicant_id {
            if !application.is_owned_by(applicant) {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&application.status) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&application.application_type()) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&application.priority) {
            return false;
        }
        if let Some(assignee) = &self.assigned_to {
            if application.assigned_to.as_ref() != Some(assignee) {
                return false;
            }
        }
        if let Some(from) = self.submitted_from {
            if application.submitted_at < from {
                return false;
            }
        }
        if let Some(to) = self.submitted_to {
            if application.submitted_at > to {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => application.matches_search(term),
            _ => true,
        }
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Account roles known to the identity component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

/// The slice of a user account the grant workflow reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub email_verified: bool,
}

impl UserAccount {
    /// Whether status emails may be sent to this account.
    pub fn is_reachable(&self) -> bool {
        self.is_active && self.email_verified
    }
}

/// Read-only view of the identity store.
pub trait UserDirectory: Send + Sync {
    fn fetch(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError>;
    fn administrators(&self) -> Result<Vec<UserAccount>, RepositoryError>;
}
