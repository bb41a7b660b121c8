use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::Serialize;

use super::clock::{Clock, SystemClock};
use super::domain::{
    Application, ApplicationId, ApplicationMutation, ApplicationNumber, ApplicationPatch,
    ApplicationReview, ApplicationStatus, ApplicationType, Assignment, BulkStatusUpdate,
    HistoryEventKind, NewApplication, NumberingScope, Priority, ReviewDecision,
    StatusHistoryEntry, StatusTransition, UserId,
};
use super::notifications::{Notification, NotificationDispatcher};
use super::repository::{
    ApplicationQuery, ApplicationRepository, RepositoryError, UpdateGuard, UserDirectory,
    UserRole,
};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PENDING_LIMIT: usize = 20;

const NOT_PENDING: &str = "Only pending applications can be updated";
const NOT_CANCELLABLE: &str = "This application cannot be cancelled";

/// The authenticated party performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: UserRole,
}

impl Actor {
    pub fn new(id: UserId, role: UserRole) -> Self {
        Self { id, role }
    }

    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    fn may_view(&self, application: &Application) -> bool {
        self.is_admin() || application.is_owned_by(&self.id)
    }
}

/// One-based page request. Out-of-range values are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Pagination {
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A slice of a newest-first listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    fn slice(records: Vec<T>, pagination: Pagination) -> Self {
        let total_count = records.len();
        let total_pages = total_count.div_ceil(pagination.limit);
        let skip = (pagination.page - 1).saturating_mul(pagination.limit);
        let items = records
            .into_iter()
            .skip(skip)
            .take(pagination.limit)
            .collect();
        Self {
            items,
            current_page: pagination.page,
            total_pages,
            total_count,
            has_next: pagination.page < total_pages,
            has_prev: pagination.page > 1,
        }
    }

    pub fn map<V>(self, f: impl FnMut(T) -> V) -> Page<V> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            total_pages: self.total_pages,
            total_count: self.total_count,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// Applicant-side listing filter. An empty list matches every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicantFilter {
    pub statuses: Vec<ApplicationStatus>,
    pub types: Vec<ApplicationType>,
}

/// Dashboard counters. Every enum value is present, zero-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStats {
    pub total: usize,
    pub by_status: BTreeMap<ApplicationStatus, usize>,
    pub by_type: BTreeMap<ApplicationType, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    pub this_month: usize,
    pub this_week: usize,
}

/// Lifecycle engine for grant applications. The only component that changes status, history,
/// reviews, assignment, or numbering.
pub struct GrantApplicationService<R, U> {
    repository: Arc<R>,
    users: Arc<U>,
    notifications: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl<R, U> GrantApplicationService<R, U>
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    pub fn new(repository: Arc<R>, users: Arc<U>, notifications: NotificationDispatcher) -> Self {
        Self::with_clock(repository, users, notifications, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repository: Arc<R>,
        users: Arc<U>,
        notifications: NotificationDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            users,
            notifications,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Number, seed, and persist a new application, then notify administrators.
    pub fn submit(
        &self,
        applicant: &UserId,
        submission: NewApplication,
    ) -> Result<Application, ApplicationServiceError> {
        let now = self.clock.now();
        let scope = NumberingScope::for_submission(submission.application_type(), now);
        let sequence = self.repository.next_sequence(&scope)?;

        let application = Application {
            id: ApplicationId::generate(),
            application_number: scope.number(sequence),
            applicant_id: applicant.clone(),
            title: submission.title,
            description: submission.description,
            urgency_reason: submission.urgency_reason,
            details: submission.details,
            financial_info: submission.financial_info,
            guardian_info: submission.guardian_info,
            supporting_documents: submission
                .supporting_documents
                .into_iter()
                .map(|document| document.into_document(now))
                .collect(),
            tags: submission.tags,
            status: ApplicationStatus::Pending,
            priority: submission.priority.unwrap_or_default(),
            assigned_to: None,
            submitted_at: now,
            last_updated_at: now,
            estimated_completion_date: None,
            actual_completion_date: None,
            rejection_reason: None,
            status_history: vec![StatusHistoryEntry {
                status: ApplicationStatus::Pending,
                changed_by: applicant.clone(),
                changed_at: now,
                reason: Some("Application submitted".to_string()),
                kind: HistoryEventKind::StatusChange,
            }],
            reviews: Vec::new(),
            is_deleted: false,
            deleted_at: None,
        };

        let stored = self.repository.insert(application)?;
        tracing::info!(
            application_number = %stored.application_number,
            application_type = %stored.application_type(),
            applicant = %applicant,
            "application submitted"
        );
        self.notifications.dispatch(Notification::Submitted {
            application: Box::new(stored.clone()),
        });
        Ok(stored)
    }

    /// Ownership and status checks for an applicant edit, run before the payload is parsed.
    pub fn authorize_update(
        &self,
        id: &ApplicationId,
        applicant: &UserId,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch_live(id)?;
        if !current.is_owned_by(applicant) {
            return Err(ApplicationServiceError::Forbidden(
                "You can only update your own applications".to_string(),
            ));
        }
        if current.status != ApplicationStatus::Pending {
            return Err(ApplicationServiceError::InvalidState(NOT_PENDING.to_string()));
        }
        Ok(current)
    }

    /// Ownership and status checks for an applicant cancellation.
    pub fn authorize_cancel(
        &self,
        id: &ApplicationId,
        applicant: &UserId,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch_live(id)?;
        if !current.is_owned_by(applicant) {
            return Err(ApplicationServiceError::Forbidden(
                "You can only cancel your own applications".to_string(),
            ));
        }
        if current.status.is_terminal() {
            return Err(ApplicationServiceError::InvalidState(NOT_CANCELLABLE.to_string()));
        }
        Ok(current)
    }

    /// Merge an applicant's edits into a pending application they own.
    pub fn applicant_update(
        &self,
        id: &ApplicationId,
        applicant: &UserId,
        patch: ApplicationPatch,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.authorize_update(id, applicant)?;
        let application_type = current.application_type();
        if let Some(block) = patch.details.mismatch(application_type) {
            return Err(ApplicationServiceError::InvalidInput(format!(
                "{block} does not apply to {application_type} applications"
            )));
        }

        let guard = UpdateGuard::owned_by(applicant.clone()).in_statuses(&[ApplicationStatus::Pending]);
        let mutation = ApplicationMutation::at(self.clock.now()).with_patch(patch);
        let updated = self
            .repository
            .apply(id, &guard, mutation)
            .map_err(|error| precondition_as(error, NOT_PENDING))?;
        tracing::debug!(application_number = %updated.application_number, "application updated by applicant");
        Ok(updated)
    }

    /// Move a non-terminal application the applicant owns to CANCELLED.
    pub fn applicant_cancel(
        &self,
        id: &ApplicationId,
        applicant: &UserId,
        reason: Option<String>,
    ) -> Result<Application, ApplicationServiceError> {
        self.authorize_cancel(id, applicant)?;

        let guard =
            UpdateGuard::owned_by(applicant.clone()).in_statuses(&ApplicationStatus::CANCELLABLE);
        let mutation = ApplicationMutation::at(self.clock.now()).with_transition(StatusTransition {
            status: ApplicationStatus::Cancelled,
            changed_by: applicant.clone(),
            reason: Some(reason.unwrap_or_else(|| "Application cancelled by applicant".to_string())),
        });
        let cancelled = self
            .repository
            .apply(id, &guard, mutation)
            .map_err(|error| precondition_as(error, NOT_CANCELLABLE))?;
        tracing::info!(application_number = %cancelled.application_number, "application cancelled by applicant");
        Ok(cancelled)
    }

    /// Record an administrator's decision and notify the applicant.
    pub fn review(
        &self,
        id: &ApplicationId,
        reviewer: &UserId,
        decision: ReviewDecision,
    ) -> Result<Application, ApplicationServiceError> {
        let now = self.clock.now();
        let status = decision.status;

        let mut mutation = ApplicationMutation::at(now).with_transition(StatusTransition {
            status,
            changed_by: reviewer.clone(),
            reason: Some("Application reviewed".to_string()),
        });
        mutation.review = Some(ApplicationReview {
            reviewed_by: reviewer.clone(),
            reviewed_at: now,
            status,
            comments: decision.comments,
            internal_notes: decision.internal_notes,
            follow_up_required: decision.follow_up_required,
            follow_up_date: decision.follow_up_date,
        });
        mutation.estimated_completion_date = decision.estimated_completion_date;
        mutation.rejection_reason = decision.rejection_reason;
        if status == ApplicationStatus::Completed {
            mutation.actual_completion_date = Some(now);
        }

        let reviewed = self.repository.apply(id, &UpdateGuard::none(), mutation)?;
        tracing::info!(
            application_number = %reviewed.application_number,
            %status,
            reviewer = %reviewer,
            "application reviewed"
        );
        self.notifications.dispatch(Notification::StatusChanged {
            application: Box::new(reviewed.clone()),
            status,
            changed_at: now,
        });
        Ok(reviewed)
    }

    /// Hand an application to an administrator. The status is left as it is.
    pub fn assign(
        &self,
        id: &ApplicationId,
        assignee: &UserId,
        assigner: &UserId,
    ) -> Result<Application, ApplicationServiceError> {
        self.fetch_live(id)?;
        let is_admin = self
            .users
            .fetch(assignee)?
            .is_some_and(|account| account.role.is_admin());
        if !is_admin {
            return Err(ApplicationServiceError::InvalidInput(
                "Invalid assignee. User must be an admin.".to_string(),
            ));
        }

        let mut mutation = ApplicationMutation::at(self.clock.now());
        mutation.assignment = Some(Assignment {
            assignee: assignee.clone(),
            assigned_by: assigner.clone(),
        });
        let assigned = self.repository.apply(id, &UpdateGuard::none(), mutation)?;
        tracing::info!(
            application_number = %assigned.application_number,
            assignee = %assignee,
            "application assigned"
        );
        Ok(assigned)
    }

    /// Set one status on many applications. Unknown or deleted ids are skipped.
    pub fn bulk_update_status(
        &self,
        update: BulkStatusUpdate,
        changed_by: &UserId,
    ) -> Result<usize, ApplicationServiceError> {
        let status = update.status;
        let reason = update
            .reason
            .unwrap_or_else(|| format!("Bulk status update to {status}"));
        let mutation = ApplicationMutation::at(self.clock.now()).with_transition(StatusTransition {
            status,
            changed_by: changed_by.clone(),
            reason: Some(reason),
        });

        let updated = self
            .repository
            .apply_many(&update.application_ids, &mutation)?;
        tracing::info!(
            requested = update.application_ids.len(),
            updated,
            %status,
            "bulk status update applied"
        );
        Ok(updated)
    }

    pub fn get(
        &self,
        id: &ApplicationId,
        viewer: &Actor,
    ) -> Result<Application, ApplicationServiceError> {
        let application = self.fetch_live(id)?;
        authorize_view(viewer, application)
    }

    pub fn get_by_number(
        &self,
        number: &ApplicationNumber,
        viewer: &Actor,
    ) -> Result<Application, ApplicationServiceError> {
        let application = self
            .repository
            .fetch_by_number(number)?
            .ok_or(ApplicationServiceError::NotFound)?;
        authorize_view(viewer, application)
    }

    pub fn list_for_applicant(
        &self,
        applicant: &UserId,
        filter: ApplicantFilter,
        pagination: Pagination,
    ) -> Result<Page<Application>, ApplicationServiceError> {
        let query = ApplicationQuery {
            applicant_id: Some(applicant.clone()),
            statuses: filter.statuses,
            types: filter.types,
            ..ApplicationQuery::default()
        };
        let records = self.repository.query(&query)?;
        Ok(Page::slice(records, pagination))
    }

    pub fn list_all(
        &self,
        query: &ApplicationQuery,
        pagination: Pagination,
    ) -> Result<Page<Application>, ApplicationServiceError> {
        let records = self.repository.query(query)?;
        Ok(Page::slice(records, pagination))
    }

    /// Review queue: most urgent first, then oldest first.
    pub fn pending(&self, limit: Option<usize>) -> Result<Vec<Application>, ApplicationServiceError> {
        let query = ApplicationQuery {
            statuses: ApplicationStatus::AWAITING_REVIEW.to_vec(),
            ..ApplicationQuery::default()
        };
        let mut queue = self.repository.query(&query)?;
        queue.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        });
        queue.truncate(limit.unwrap_or(DEFAULT_PENDING_LIMIT).max(1));
        Ok(queue)
    }

    pub fn stats(&self) -> Result<ApplicationStats, ApplicationServiceError> {
        let now = self.clock.now();
        let month_start = start_of_day(now - Duration::days(i64::from(now.day0())));
        let week_start = start_of_day(
            now - Duration::days(i64::from(now.weekday().num_days_from_sunday())),
        );

        let records = self.repository.query(&ApplicationQuery::default())?;
        let mut stats = ApplicationStats {
            total: records.len(),
            by_status: zeroed(ApplicationStatus::ordered()),
            by_type: zeroed(ApplicationType::ordered()),
            by_priority: zeroed(Priority::ordered()),
            this_month: 0,
            this_week: 0,
        };
        for record in &records {
            *stats.by_status.entry(record.status).or_default() += 1;
            *stats.by_type.entry(record.application_type()).or_default() += 1;
            *stats.by_priority.entry(record.priority).or_default() += 1;
            if record.submitted_at >= month_start {
                stats.this_month += 1;
            }
            if record.submitted_at >= week_start {
                stats.this_week += 1;
            }
        }
        Ok(stats)
    }

    /// Applications whose current review asked for a follow-up that is now due.
    pub fn follow_ups_due(&self) -> Result<Vec<Application>, ApplicationServiceError> {
        let now = self.clock.now();
        let mut due: Vec<(DateTime<Utc>, Application)> = self
            .repository
            .query(&ApplicationQuery::default())?
            .into_iter()
            .filter(|record| {
                !matches!(
                    record.status,
                    ApplicationStatus::Completed | ApplicationStatus::Cancelled
                )
            })
            .filter_map(|record| {
                let review = record.current_review()?;
                let date = review.follow_up_date.filter(|_| review.follow_up_required)?;
                (date <= now).then_some((date, record))
            })
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(due.into_iter().map(|(_, record)| record).collect())
    }

    /// Non-terminal applications past their estimated completion date.
    pub fn overdue(&self) -> Result<Vec<Application>, ApplicationServiceError> {
        let now = self.clock.now();
        let mut overdue: Vec<(DateTime<Utc>, Application)> = self
            .repository
            .query(&ApplicationQuery::default())?
            .into_iter()
            .filter(|record| !record.status.is_terminal())
            .filter_map(|record| {
                let date = record.estimated_completion_date?;
                (date < now).then_some((date, record))
            })
            .collect();
        overdue.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(overdue.into_iter().map(|(_, record)| record).collect())
    }

    /// Hide an application from every listing. Owners and administrators only.
    pub fn soft_delete(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<Application, ApplicationServiceError> {
        let current = self.fetch_live(id)?;
        if !actor.may_view(&current) {
            return Err(ApplicationServiceError::Forbidden(
                "You can only delete your own applications".to_string(),
            ));
        }

        let guard = if actor.is_admin() {
            UpdateGuard::none()
        } else {
            UpdateGuard::owned_by(actor.id.clone())
        };
        let mut mutation = ApplicationMutation::at(self.clock.now());
        mutation.soft_delete = true;
        let deleted = self.repository.apply(id, &guard, mutation)?;
        tracing::info!(application_number = %deleted.application_number, by = %actor.id, "application deleted");
        Ok(deleted)
    }

    fn fetch_live(&self, id: &ApplicationId) -> Result<Application, ApplicationServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(ApplicationServiceError::NotFound)
    }
}

fn authorize_view(
    viewer: &Actor,
    application: Application,
) -> Result<Application, ApplicationServiceError> {
    if viewer.may_view(&application) {
        Ok(application)
    } else {
        Err(ApplicationServiceError::Forbidden(
            "You can only access your own applications".to_string(),
        ))
    }
}

fn precondition_as(error: RepositoryError, message: &str) -> ApplicationServiceError {
    match error {
        RepositoryError::PreconditionFailed(_) => {
            ApplicationServiceError::InvalidState(message.to_string())
        }
        other => other.into(),
    }
}

fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn zeroed<K: Copy + Ord>(keys: &[K]) -> BTreeMap<K, usize> {
    keys.iter().map(|key| (*key, 0)).collect()
}

/// Error raised by the lifecycle service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error("Application not found")]
    NotFound,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(RepositoryError),
}

impl From<RepositoryError> for ApplicationServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::PreconditionFailed(reason) => Self::InvalidState(reason),
            other => Self::Store(other),
        }
    }
}
