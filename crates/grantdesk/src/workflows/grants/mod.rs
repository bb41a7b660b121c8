//! Grant application intake, review, and lifecycle tracking.
//!
//! Applicants submit school fees, school support, or orphanage donation requests; administrators
//! review, assign, and bulk-update them. [`GrantApplicationService`] owns every status change and
//! keeps the status history and review trail consistent with the stored record.

pub mod clock;
pub mod directory;
pub mod domain;
pub mod notifications;
pub mod repository;
pub mod response;
pub mod router;
pub mod service;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{DirectoryImportError, InMemoryUserDirectory};
pub use domain::{
    AcademicInfo, Application, ApplicationDetails, ApplicationId, ApplicationNumber,
    ApplicationPatch, ApplicationReview, ApplicationStatus, ApplicationType, BreakdownLine,
    BulkStatusUpdate, FinancialInfo, GuardianInfo, HistoryEventKind, NewApplication,
    OperationalNeed, OrphanageData, Priority, ReviewDecision, SchoolSupportData, StatusHistoryEntry,
    SupportType, SupportingDocument, UserId,
};
pub use notifications::{
    DeliveryReport, MailError, Mailer, Notification, NotificationDispatcher, NotificationWorker,
    OutboundEmail,
};
pub use repository::{
    ApplicationQuery, ApplicationRepository, RepositoryError, UpdateGuard, UserAccount,
    UserDirectory, UserRole,
};
pub use response::{ApiError, ApiResponse, ApplicationView};
pub use router::{grants_router, GrantsState};
pub use service::{
    Actor, ApplicantFilter, ApplicationServiceError, ApplicationStats, GrantApplicationService,
    Page, Pagination,
};
pub use store::InMemoryApplicationStore;
pub use validation::ValidationFailure;
