use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{
    Application, ApplicationId, ApplicationNumber, ApplicationStatus, ApplicationType, Priority,
    UserId,
};
use super::repository::{ApplicationQuery, ApplicationRepository, UserDirectory};
use super::response::{ApiError, ApiResponse, ApplicationView};
use super::service::{ApplicantFilter, GrantApplicationService, Page, Pagination};
use super::validation::{
    self, validate_assignment, validate_bulk_update, validate_cancellation, validate_creation,
    validate_review, validate_update, ValidationFailure,
};
use crate::auth::{AuthenticatedUser, TokenAuthority};

type HandlerResult = Result<ApiResponse<Value>, ApiError>;

/// Shared state for the grants routes.
pub struct GrantsState<R, U> {
    pub service: Arc<GrantApplicationService<R, U>>,
    pub auth: Arc<TokenAuthority>,
}

impl<R, U> Clone for GrantsState<R, U> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            auth: Arc::clone(&self.auth),
        }
    }
}

/// Router exposing the application endpoints under `/api/v1/applications`.
pub fn grants_router<R, U>(state: GrantsState<R, U>) -> Router
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let routes = Router::new()
        .route("/", post(submit_handler::<R, U>))
        .route("/my-applications", get(my_applications_handler::<R, U>))
        .route("/admin/all", get(admin_list_handler::<R, U>))
        .route("/admin/stats", get(stats_handler::<R, U>))
        .route("/admin/pending", get(pending_handler::<R, U>))
        .route("/admin/follow-ups", get(follow_ups_handler::<R, U>))
        .route("/admin/overdue", get(overdue_handler::<R, U>))
        .route("/admin/bulk-update", patch(bulk_update_handler::<R, U>))
        .route(
            "/number/:application_number",
            get(by_number_handler::<R, U>),
        )
        .route(
            "/:id",
            get(get_handler::<R, U>)
                .put(update_handler::<R, U>)
                .delete(delete_handler::<R, U>),
        )
        .route("/:id/cancel", patch(cancel_handler::<R, U>))
        .route("/:id/review", post(review_handler::<R, U>))
        .route("/:id/assign", patch(assign_handler::<R, U>))
        .with_state(state);

    Router::new().nest("/api/v1/applications", routes)
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| {
            ApiError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
        })
}

fn admin_user<R, U>(
    state: &GrantsState<R, U>,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, ApiError> {
    let user = state.auth.authenticate(headers)?;
    user.require_admin()?;
    Ok(user)
}

fn application_payload(application: Application, viewer: &AuthenticatedUser) -> Value {
    json!({ "application": ApplicationView::for_viewer(application, viewer.role.is_admin()) })
}

fn list_payload(applications: Vec<Application>, viewer: &AuthenticatedUser) -> Value {
    let admin = viewer.role.is_admin();
    let views: Vec<ApplicationView> = applications
        .into_iter()
        .map(|application| ApplicationView::for_viewer(application, admin))
        .collect();
    json!({ "applications": views })
}

fn page_payload(page: Page<Application>, viewer: &AuthenticatedUser) -> Value {
    let admin = viewer.role.is_admin();
    let page = page.map(|application| ApplicationView::for_viewer(application, admin));
    json!({
        "applications": page.items,
        "pagination": {
            "currentPage": page.current_page,
            "totalPages": page.total_pages,
            "totalCount": page.total_count,
            "hasNext": page.has_next,
            "hasPrev": page.has_prev,
        }
    })
}

/// Comma-separated enum filter, e.g. `status=PENDING,UNDER_REVIEW`.
fn label_filter<T: FromStr>(
    raw: Option<&str>,
    name: &str,
    errors: &mut Vec<String>,
) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter_map(|value| match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.push(format!("Invalid {name} filter '{value}'"));
                None
            }
        })
        .collect()
}

fn pagination(page: Option<&str>, limit: Option<&str>) -> Pagination {
    Pagination::new(
        page.and_then(|raw| raw.trim().parse().ok()),
        limit.and_then(|raw| raw.trim().parse().ok()),
    )
}

async fn submit_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = state.auth.authenticate(&headers)?;
    let payload = json_body(payload)?;
    let submission = validate_creation(&payload, state.service.now())?;
    let application = state.service.submit(&user.id, submission)?;
    Ok(ApiResponse::created(
        "Application submitted successfully",
        application_payload(application, &user),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct ApplicantListParams {
    page: Option<String>,
    limit: Option<String>,
    status: Option<String>,
    #[serde(rename = "type")]
    application_type: Option<String>,
}

async fn my_applications_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Query(params): Query<ApplicantListParams>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = state.auth.authenticate(&headers)?;
    let mut errors = Vec::new();
    let filter = ApplicantFilter {
        statuses: label_filter(params.status.as_deref(), "status", &mut errors),
        types: label_filter(params.application_type.as_deref(), "type", &mut errors),
    };
    if !errors.is_empty() {
        return Err(ValidationFailure { errors }.into());
    }
    let page = state.service.list_for_applicant(
        &user.id,
        filter,
        pagination(params.page.as_deref(), params.limit.as_deref()),
    )?;
    Ok(ApiResponse::ok(
        "Applications retrieved successfully",
        page_payload(page, &user),
    ))
}

async fn get_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = state.auth.authenticate(&headers)?;
    let application = state.service.get(&ApplicationId(id), &user.actor())?;
    Ok(ApiResponse::ok(
        "Application retrieved successfully",
        application_payload(application, &user),
    ))
}

async fn by_number_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Path(number): Path<String>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = state.auth.authenticate(&headers)?;
    let application = state
        .service
        .get_by_number(&ApplicationNumber(number), &user.actor())?;
    Ok(ApiResponse::ok(
        "Application retrieved successfully",
        application_payload(application, &user),
    ))
}

async fn update_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = state.auth.authenticate(&headers)?;
    let id = ApplicationId(id);
    state.service.authorize_update(&id, &user.id)?;
    let payload = json_body(payload)?;
    let patch = validate_update(&payload, state.service.now())?;
    let application = state.service.applicant_update(&id, &user.id, patch)?;
    Ok(ApiResponse::ok(
        "Application updated successfully",
        application_payload(application, &user),
    ))
}

async fn cancel_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = state.auth.authenticate(&headers)?;
    let id = ApplicationId(id);
    state.service.authorize_cancel(&id, &user.id)?;
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|error| ApiError::BadRequest(format!("Invalid JSON body: {error}")))?
    };
    let reason = validate_cancellation(&payload)?;
    let application = state.service.applicant_cancel(&id, &user.id, reason)?;
    Ok(ApiResponse::ok(
        "Application cancelled successfully",
        application_payload(application, &user),
    ))
}

async fn delete_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = state.auth.authenticate(&headers)?;
    let deleted = state
        .service
        .soft_delete(&ApplicationId(id), &user.actor())?;
    Ok(ApiResponse::ok(
        "Application deleted successfully",
        json!({
            "id": deleted.id,
            "applicationNumber": deleted.application_number,
            "deletedAt": deleted.deleted_at,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminListParams {
    page: Option<String>,
    limit: Option<String>,
    status: Option<String>,
    #[serde(rename = "type")]
    application_type: Option<String>,
    priority: Option<String>,
    assigned_to: Option<String>,
    search: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl AdminListParams {
    fn query(&self) -> Result<ApplicationQuery, ValidationFailure> {
        let mut errors = Vec::new();
        let statuses: Vec<ApplicationStatus> =
            label_filter(self.status.as_deref(), "status", &mut errors);
        let types: Vec<ApplicationType> =
            label_filter(self.application_type.as_deref(), "type", &mut errors);
        let priorities: Vec<Priority> =
            label_filter(self.priority.as_deref(), "priority", &mut errors);

        let mut date = |raw: Option<&str>, name: &str| {
            let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
            let parsed = validation::parse_date(raw);
            if parsed.is_none() {
                errors.push(format!("Invalid {name} date '{raw}'"));
            }
            parsed
        };
        let submitted_from = date(self.from.as_deref(), "from");
        let submitted_to = date(self.to.as_deref(), "to");

        if !errors.is_empty() {
            return Err(ValidationFailure { errors });
        }
        Ok(ApplicationQuery {
            applicant_id: None,
            statuses,
            types,
            priorities,
            assigned_to: self
                .assigned_to
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| UserId(id.to_string())),
            submitted_from,
            submitted_to,
            search: self.search.clone(),
        })
    }
}

async fn admin_list_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Query(params): Query<AdminListParams>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = admin_user(&state, &headers)?;
    let query = params.query()?;
    let page = state.service.list_all(
        &query,
        pagination(params.page.as_deref(), params.limit.as_deref()),
    )?;
    Ok(ApiResponse::ok(
        "Applications retrieved successfully",
        page_payload(page, &user),
    ))
}

async fn stats_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    admin_user(&state, &headers)?;
    let stats = state.service.stats()?;
    Ok(ApiResponse::ok(
        "Application statistics retrieved successfully",
        json!({ "stats": stats }),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct PendingParams {
    limit: Option<String>,
}

async fn pending_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Query(params): Query<PendingParams>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = admin_user(&state, &headers)?;
    let limit = params
        .limit
        .as_deref()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|limit| *limit > 0);
    let queue = state.service.pending(limit)?;
    Ok(ApiResponse::ok(
        "Pending applications retrieved successfully",
        list_payload(queue, &user),
    ))
}

async fn follow_ups_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = admin_user(&state, &headers)?;
    let due = state.service.follow_ups_due()?;
    Ok(ApiResponse::ok(
        "Follow-ups retrieved successfully",
        list_payload(due, &user),
    ))
}

async fn overdue_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = admin_user(&state, &headers)?;
    let overdue = state.service.overdue()?;
    Ok(ApiResponse::ok(
        "Overdue applications retrieved successfully",
        list_payload(overdue, &user),
    ))
}

async fn review_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = admin_user(&state, &headers)?;
    let payload = json_body(payload)?;
    let decision = validate_review(&payload, state.service.now())?;
    let application = state
        .service
        .review(&ApplicationId(id), &user.id, decision)?;
    Ok(ApiResponse::ok(
        "Application reviewed successfully",
        application_payload(application, &user),
    ))
}

async fn assign_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = admin_user(&state, &headers)?;
    let payload = json_body(payload)?;
    let assignee = validate_assignment(&payload)?;
    let application = state
        .service
        .assign(&ApplicationId(id), &assignee, &user.id)?;
    Ok(ApiResponse::ok(
        "Application assigned successfully",
        application_payload(application, &user),
    ))
}

async fn bulk_update_handler<R, U>(
    State(state): State<GrantsState<R, U>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult
where
    R: ApplicationRepository + 'static,
    U: UserDirectory + 'static,
{
    let user = admin_user(&state, &headers)?;
    let payload = json_body(payload)?;
    let update = validate_bulk_update(&payload)?;
    let requested = update.application_ids.len();
    let updated = state.service.bulk_update_status(update, &user.id)?;
    Ok(ApiResponse::ok(
        format!("Successfully updated {updated} applications"),
        json!({ "requested": requested, "updated": updated }),
    ))
}
