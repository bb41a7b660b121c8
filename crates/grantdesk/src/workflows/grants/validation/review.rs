use chrono::{DateTime, Utc};
use serde_json::Value;

use super::fields::{Read, Report};
use super::{as_object, ValidationFailure, MAX_BULK_IDS, MAX_REASON_CHARS, MAX_REVIEW_TEXT_CHARS};
use crate::workflows::grants::domain::{
    ApplicationId, ApplicationStatus, BulkStatusUpdate, ReviewDecision, UserId,
};

/// Validate an administrator's review decision.
pub fn validate_review(
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<ReviewDecision, ValidationFailure> {
    let object = as_object(payload)?;
    let mut report = Report::default();

    let status = match report.label::<ApplicationStatus>(object, "status", "Invalid status") {
        Read::Value(status) => Some(status),
        Read::Missing => {
            report.push("Status is required");
            None
        }
        Read::Invalid => None,
    };

    let comments = report.required_text(object, "comments", "Review comments are required");
    let comments = report.limit_length(
        comments,
        MAX_REVIEW_TEXT_CHARS,
        "Comments must be less than 1000 characters",
    );
    let internal_notes = report.optional_text(object, "internalNotes");
    let internal_notes = report.limit_length(
        internal_notes,
        MAX_REVIEW_TEXT_CHARS,
        "Internal notes must be less than 1000 characters",
    );

    let follow_up_required = report
        .flag(object, "followUpRequired")
        .value()
        .unwrap_or(false);
    let follow_up_date = match report.date(object, "followUpDate") {
        Read::Value(date) if date <= now => {
            report.push("Follow-up date must be in the future");
            None
        }
        Read::Value(date) => Some(date),
        Read::Missing => {
            if follow_up_required {
                report.push("Follow-up date is required when follow-up is required");
            }
            None
        }
        Read::Invalid => None,
    };

    let rejection_reason = report.optional_text(object, "rejectionReason");
    if status == Some(ApplicationStatus::Rejected) && rejection_reason.is_none() {
        report.push("Rejection reason is required when rejecting an application");
    }

    let estimated_completion_date = match report.date(object, "estimatedCompletionDate") {
        Read::Value(date) if date <= now => {
            report.push("Estimated completion date must be in the future");
            None
        }
        other => other.value(),
    };

    match (status, comments) {
        (Some(status), Some(comments)) if report.is_clean() => Ok(ReviewDecision {
            status,
            comments,
            internal_notes,
            follow_up_required,
            follow_up_date,
            rejection_reason,
            estimated_completion_date,
        }),
        _ => Err(report.into_failure()),
    }
}

/// Validate a bulk status change. Duplicate ids are collapsed, keeping first occurrence order.
pub fn validate_bulk_update(payload: &Value) -> Result<BulkStatusUpdate, ValidationFailure> {
    let object = as_object(payload)?;
    let mut report = Report::default();

    const NOT_A_LIST: &str = "Application IDs must be an array";
    let application_ids = match report.array(object, "applicationIds", NOT_A_LIST) {
        Read::Value(items) if items.is_empty() => {
            report.push("At least one application ID is required");
            None
        }
        Read::Value(items) if items.len() > MAX_BULK_IDS => {
            report.push("Maximum 50 applications can be updated at once");
            None
        }
        Read::Value(items) => {
            let mut ids: Vec<ApplicationId> = Vec::with_capacity(items.len());
            let mut clean = true;
            for item in items {
                match item.as_str().map(str::trim) {
                    Some(id) if !id.is_empty() => {
                        let id = ApplicationId(id.to_string());
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                    _ => clean = false,
                }
            }
            if !clean {
                report.push("Application IDs must be non-empty strings");
            }
            clean.then_some(ids)
        }
        Read::Missing => {
            report.push(NOT_A_LIST);
            None
        }
        Read::Invalid => None,
    };

    let status = match report.label::<ApplicationStatus>(object, "status", "Invalid status") {
        Read::Value(status) => Some(status),
        Read::Missing => {
            report.push("Status is required");
            None
        }
        Read::Invalid => None,
    };
    let reason = report.optional_text(object, "reason");
    let reason = report.limit_length(
        reason,
        MAX_REASON_CHARS,
        "Reason must be less than 500 characters",
    );

    match (application_ids, status) {
        (Some(application_ids), Some(status)) if report.is_clean() => Ok(BulkStatusUpdate {
            application_ids,
            status,
            reason,
        }),
        _ => Err(report.into_failure()),
    }
}

/// Validate an assignment request and return the requested assignee.
pub fn validate_assignment(payload: &Value) -> Result<UserId, ValidationFailure> {
    let object = as_object(payload)?;
    let mut report = Report::default();
    match report.required_text(object, "assignedTo", "Assignee is required") {
        Some(assignee) if report.is_clean() => Ok(UserId(assignee)),
        _ => Err(report.into_failure()),
    }
}

/// Validate an optional cancellation body. A missing body means no reason was given.
pub fn validate_cancellation(payload: &Value) -> Result<Option<String>, ValidationFailure> {
    if payload.is_null() {
        return Ok(None);
    }
    let object = as_object(payload)?;
    let mut report = Report::default();
    let reason = report.optional_text(object, "reason");
    if report.is_clean() {
        Ok(reason)
    } else {
        Err(report.into_failure())
    }
}
