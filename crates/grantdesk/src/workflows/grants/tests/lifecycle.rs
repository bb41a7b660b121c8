use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use super::common::*;
use crate::workflows::grants::domain::{
    ApplicationId, ApplicationNumber, ApplicationPatch, ApplicationStatus, ApplicationType,
    BulkStatusUpdate, HistoryEventKind, Priority,
};
use crate::workflows::grants::repository::{ApplicationQuery, UserRole};
use crate::workflows::grants::validation::{
    validate_bulk_update, validate_creation, validate_review, validate_update,
};
use crate::workflows::grants::{
    Actor, ApplicantFilter, ApplicationServiceError, ApplicationView, Pagination,
};

fn applicant() -> Actor {
    Actor::new(user(APPLICANT), UserRole::User)
}

fn admin() -> Actor {
    Actor::new(user(ADMIN), UserRole::Admin)
}

#[test]
fn submission_starts_pending_with_first_number_of_the_month() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());

    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(application.application_number.0, "SF2025100001");
    assert_eq!(application.priority, Priority::Medium);
    assert_eq!(application.status_history.len(), 1);
    let seed = &application.status_history[0];
    assert_eq!(seed.status, ApplicationStatus::Pending);
    assert_eq!(seed.changed_by, user(APPLICANT));
    assert_eq!(seed.reason.as_deref(), Some("Application submitted"));
    assert_eq!(application.supporting_documents[0].uploaded_at, now());
    assert_eq!(harness.store.len(), 1);
}

#[test]
fn numbering_is_sequential_per_type_and_month() {
    let harness = harness();
    let first = harness.submit(school_fees_payload());
    let second = harness.submit(school_fees_payload());
    let support = harness.submit(school_support_payload());
    let orphanage = harness.submit(orphanage_payload());

    assert_eq!(first.application_number.0, "SF2025100001");
    assert_eq!(second.application_number.0, "SF2025100002");
    assert_eq!(support.application_number.0, "SS2025100001");
    assert_eq!(orphanage.application_number.0, "OD2025100001");

    harness
        .clock
        .set(Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap());
    let next_month = harness.submit(school_fees_payload());
    assert_eq!(next_month.application_number.0, "SF2025110001");
}

#[test]
fn rejection_without_reason_never_reaches_the_store() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());

    let failure = validate_review(
        &json!({ "status": "REJECTED", "comments": "incomplete" }),
        now(),
    )
    .expect_err("missing rejection reason is rejected");
    assert!(failure
        .errors
        .iter()
        .any(|error| error.to_lowercase().contains("rejection reason is required")));

    let stored = harness
        .service
        .get(&application.id, &admin())
        .expect("still readable");
    assert_eq!(stored, application);
}

#[test]
fn approval_records_review_and_history() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());
    harness.clock.advance(Duration::hours(2));

    let reviewed = harness.review(
        &application,
        json!({ "status": "APPROVED", "comments": "ok", "internalNotes": "funds ring-fenced" }),
    );

    assert_eq!(reviewed.status, ApplicationStatus::Approved);
    assert_eq!(reviewed.status_history.len(), 2);
    assert_eq!(reviewed.reviews.len(), 1);
    let current = reviewed.current_review().expect("current review present");
    assert_eq!(current.status, ApplicationStatus::Approved);
    assert_eq!(current.reviewed_by, user(ADMIN));
    assert_eq!(current, reviewed.reviews.last().expect("one review"));
    assert_eq!(
        reviewed.last_updated_at,
        now() + Duration::hours(2),
        "review stamps the mutation time"
    );

    let view = ApplicationView::for_viewer(reviewed, true);
    assert_eq!(view.current_review.as_ref(), view.application.reviews.last());
}

#[test]
fn completed_review_stamps_actual_completion_date() {
    let harness = harness();
    let application = harness.submit(orphanage_payload());
    let completed = harness.review(
        &application,
        json!({ "status": "COMPLETED", "comments": "Supplies delivered" }),
    );
    assert_eq!(completed.actual_completion_date, Some(now()));
    assert!(completed.status.is_terminal());
}

#[test]
fn cancelling_twice_fails_with_invalid_state() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());
    harness.review(&application, json!({ "status": "APPROVED", "comments": "ok" }));

    let cancelled = harness
        .service
        .applicant_cancel(&application.id, &user(APPLICANT), None)
        .expect("approved applications can be cancelled");
    assert_eq!(cancelled.status, ApplicationStatus::Cancelled);
    let last = cancelled.status_history.last().expect("history");
    assert_eq!(
        last.reason.as_deref(),
        Some("Application cancelled by applicant")
    );

    match harness
        .service
        .applicant_cancel(&application.id, &user(APPLICANT), Some("again".to_string()))
    {
        Err(ApplicationServiceError::InvalidState(message)) => {
            assert_eq!(message, "This application cannot be cancelled");
        }
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn bulk_payload_over_fifty_ids_is_rejected_before_the_store() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());
    let mut ids: Vec<String> = (0..50).map(|n| format!("missing-{n}")).collect();
    ids.push(application.id.0.clone());

    let failure = validate_bulk_update(&json!({ "applicationIds": ids, "status": "APPROVED" }))
        .expect_err("51 ids are too many");
    assert!(failure
        .errors
        .iter()
        .any(|error| error.contains("Maximum 50 applications")));

    let stored = harness
        .service
        .get(&application.id, &admin())
        .expect("still readable");
    assert_eq!(stored.status, ApplicationStatus::Pending);
}

#[test]
fn history_only_grows_and_tracks_current_status() {
    let harness = harness();
    let application = harness.submit(school_support_payload());
    let mut previous = application.status_history.clone();

    let steps = [
        json!({ "status": "UNDER_REVIEW", "comments": "Checking the school" }),
        json!({ "status": "APPROVED", "comments": "Verified" }),
        json!({ "status": "COMPLETED", "comments": "Paid out" }),
    ];
    for step in steps {
        harness.clock.advance(Duration::minutes(5));
        let updated = harness.review(&application, step);
        assert!(updated.status_history.len() > previous.len());
        assert_eq!(&updated.status_history[..previous.len()], previous.as_slice());
        assert_eq!(
            updated.status_history.last().map(|entry| entry.status),
            Some(updated.status)
        );
        assert_eq!(updated.current_review(), updated.reviews.last());
        previous = updated.status_history;
    }
}

#[test]
fn school_support_without_its_block_is_rejected_identically_every_time() {
    let harness = harness();
    let mut payload = school_support_payload();
    payload
        .as_object_mut()
        .expect("object payload")
        .remove("schoolSupportData");

    let first = validate_creation(&payload, now()).expect_err("missing block");
    let second = validate_creation(&payload, now()).expect_err("missing block");
    assert_eq!(first, second);
    assert!(first
        .errors
        .contains(&"School support data is required".to_string()));
    assert!(harness.store.is_empty());
}

#[test]
fn other_applicants_cannot_update_or_cancel() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());
    let patch = ApplicationPatch {
        title: Some("Hijacked".to_string()),
        ..ApplicationPatch::default()
    };

    match harness
        .service
        .applicant_update(&application.id, &user(OTHER_APPLICANT), patch)
    {
        Err(ApplicationServiceError::Forbidden(_)) => {}
        other => panic!("expected forbidden update, got {other:?}"),
    }
    match harness
        .service
        .applicant_cancel(&application.id, &user(OTHER_APPLICANT), None)
    {
        Err(ApplicationServiceError::Forbidden(_)) => {}
        other => panic!("expected forbidden cancel, got {other:?}"),
    }
}

#[test]
fn updates_are_limited_to_pending_applications() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());

    let patch = validate_update(
        &json!({ "title": "Third term school fees", "financialInfo": { "requestedAmount": 65000 } }),
        now(),
    )
    .expect("patch validates");
    let updated = harness
        .service
        .applicant_update(&application.id, &user(APPLICANT), patch.clone())
        .expect("pending application is editable");
    assert_eq!(updated.title, "Third term school fees");
    assert_eq!(updated.financial_info.requested_amount, 65000.0);
    assert_eq!(updated.financial_info.currency, "NGN");
    assert_eq!(updated.status_history.len(), 1);

    harness.review(
        &application,
        json!({ "status": "UNDER_REVIEW", "comments": "Looking" }),
    );
    match harness
        .service
        .applicant_update(&application.id, &user(APPLICANT), patch)
    {
        Err(ApplicationServiceError::InvalidState(message)) => {
            assert_eq!(message, "Only pending applications can be updated");
        }
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn updates_cannot_attach_blocks_from_another_program() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());
    let patch = validate_update(
        &json!({ "orphanageData": orphanage_payload()["orphanageData"].clone() }),
        now(),
    )
    .expect("block itself is well formed");

    match harness
        .service
        .applicant_update(&application.id, &user(APPLICANT), patch)
    {
        Err(ApplicationServiceError::InvalidInput(message)) => {
            assert_eq!(
                message,
                "orphanageData does not apply to SCHOOL_FEES applications"
            );
        }
        other => panic!("expected invalid input, got {other:?}"),
    }
}

#[test]
fn assignment_keeps_status_and_logs_history() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());

    let assigned = harness
        .service
        .assign(&application.id, &user(SUPER_ADMIN), &user(ADMIN))
        .expect("super admins are valid assignees");
    assert_eq!(assigned.status, ApplicationStatus::Pending);
    assert_eq!(assigned.assigned_to, Some(user(SUPER_ADMIN)));
    let entry = assigned.status_history.last().expect("assignment entry");
    assert_eq!(entry.kind, HistoryEventKind::Assignment);
    assert_eq!(entry.status, ApplicationStatus::Pending);
    assert_eq!(entry.changed_by, user(ADMIN));

    match harness
        .service
        .assign(&application.id, &user(OTHER_APPLICANT), &user(ADMIN))
    {
        Err(ApplicationServiceError::InvalidInput(message)) => {
            assert_eq!(message, "Invalid assignee. User must be an admin.");
        }
        other => panic!("expected invalid assignee, got {other:?}"),
    }
    match harness.service.assign(
        &ApplicationId("nope".to_string()),
        &user(ADMIN),
        &user(ADMIN),
    ) {
        Err(ApplicationServiceError::NotFound) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn bulk_update_skips_unknown_ids() {
    let harness = harness();
    let first = harness.submit(school_fees_payload());
    let second = harness.submit(orphanage_payload());

    let updated = harness
        .service
        .bulk_update_status(
            BulkStatusUpdate {
                application_ids: vec![
                    first.id.clone(),
                    ApplicationId("missing".to_string()),
                    second.id.clone(),
                ],
                status: ApplicationStatus::UnderReview,
                reason: None,
            },
            &user(ADMIN),
        )
        .expect("bulk update succeeds");
    assert_eq!(updated, 2);

    let stored = harness
        .service
        .get(&second.id, &admin())
        .expect("readable");
    assert_eq!(stored.status, ApplicationStatus::UnderReview);
    assert_eq!(
        stored.status_history.last().and_then(|entry| entry.reason.as_deref()),
        Some("Bulk status update to UNDER_REVIEW")
    );
}

#[test]
fn applicants_only_see_their_own_records() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());
    let stranger = Actor::new(user(OTHER_APPLICANT), UserRole::User);

    harness
        .service
        .get(&application.id, &applicant())
        .expect("owner can read");
    harness
        .service
        .get_by_number(&application.application_number, &admin())
        .expect("admin can read by number");
    match harness.service.get(&application.id, &stranger) {
        Err(ApplicationServiceError::Forbidden(message)) => {
            assert_eq!(message, "You can only access your own applications");
        }
        other => panic!("expected forbidden, got {other:?}"),
    }
    match harness
        .service
        .get_by_number(&ApplicationNumber("SF2025109999".to_string()), &admin())
    {
        Err(ApplicationServiceError::NotFound) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn soft_deleted_records_disappear_from_reads_and_listings() {
    let harness = harness();
    let application = harness.submit(school_fees_payload());
    let stranger = Actor::new(user(OTHER_APPLICANT), UserRole::User);

    match harness.service.soft_delete(&application.id, &stranger) {
        Err(ApplicationServiceError::Forbidden(_)) => {}
        other => panic!("expected forbidden delete, got {other:?}"),
    }

    let deleted = harness
        .service
        .soft_delete(&application.id, &applicant())
        .expect("owner can delete");
    assert!(deleted.is_deleted);
    assert_eq!(deleted.deleted_at, Some(now()));

    match harness.service.get(&application.id, &admin()) {
        Err(ApplicationServiceError::NotFound) => {}
        other => panic!("expected not found, got {other:?}"),
    }
    let page = harness
        .service
        .list_all(&ApplicationQuery::default(), Pagination::default())
        .expect("listing works");
    assert_eq!(page.total_count, 0);
    assert_eq!(harness.store.len(), 1, "record is retained");
}

#[test]
fn applicant_listing_filters_and_paginates_newest_first() {
    let harness = harness();
    let mut submitted = Vec::new();
    for _ in 0..3 {
        submitted.push(harness.submit(school_fees_payload()));
        harness.clock.advance(Duration::minutes(1));
    }
    harness.submit(orphanage_payload());

    let page = harness
        .service
        .list_for_applicant(
            &user(APPLICANT),
            ApplicantFilter {
                types: vec![ApplicationType::SchoolFees],
                ..ApplicantFilter::default()
            },
            Pagination::new(Some(1), Some(2)),
        )
        .expect("listing works");
    assert_eq!(page.total_count, 3);
    assert_eq!(page.total_pages, 2);
    assert!(page.has_next);
    assert!(!page.has_prev);
    assert_eq!(page.items[0].id, submitted[2].id);
    assert_eq!(page.items[1].id, submitted[1].id);

    let empty = harness
        .service
        .list_for_applicant(
            &user(OTHER_APPLICANT),
            ApplicantFilter::default(),
            Pagination::default(),
        )
        .expect("listing works");
    assert_eq!(empty.total_count, 0);
    assert_eq!(empty.total_pages, 0);
}

#[test]
fn admin_listing_searches_institution_names() {
    let harness = harness();
    harness.submit(school_fees_payload());
    let orphanage = harness.submit(orphanage_payload());

    let query = ApplicationQuery {
        search: Some("hope children".to_string()),
        ..ApplicationQuery::default()
    };
    let page = harness
        .service
        .list_all(&query, Pagination::default())
        .expect("listing works");
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].id, orphanage.id);

    let query = ApplicationQuery {
        priorities: vec![Priority::Urgent, Priority::High],
        ..ApplicationQuery::default()
    };
    let page = harness
        .service
        .list_all(&query, Pagination::default())
        .expect("listing works");
    assert_eq!(page.total_count, 1);
}

#[test]
fn pending_queue_puts_urgent_first_then_oldest() {
    let harness = harness();
    let old_medium = harness.submit(school_fees_payload());
    harness.clock.advance(Duration::hours(1));
    let high = harness.submit(school_support_payload());
    harness.clock.advance(Duration::hours(1));
    let urgent = harness.submit(orphanage_payload());
    harness.clock.advance(Duration::hours(1));
    let new_medium = harness.submit(school_fees_payload());
    let approved = harness.submit(school_fees_payload());
    harness.review(&approved, json!({ "status": "APPROVED", "comments": "ok" }));

    let queue = harness.service.pending(None).expect("queue");
    let ids: Vec<_> = queue.iter().map(|record| record.id.clone()).collect();
    assert_eq!(ids, vec![urgent.id, high.id, old_medium.id, new_medium.id]);

    let limited = harness.service.pending(Some(2)).expect("queue");
    assert_eq!(limited.len(), 2);
}

#[test]
fn stats_are_zero_filled_and_windowed() {
    let harness = harness();
    // 2025-10-15 is a Wednesday; the week starts Sunday 2025-10-12.
    harness
        .clock
        .set(Utc.with_ymd_and_hms(2025, 9, 30, 23, 0, 0).unwrap());
    harness.submit(school_fees_payload());
    harness
        .clock
        .set(Utc.with_ymd_and_hms(2025, 10, 11, 12, 0, 0).unwrap());
    harness.submit(orphanage_payload());
    harness.clock.set(now());
    harness.submit(school_fees_payload());

    let stats = harness.service.stats().expect("stats");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.this_month, 2);
    assert_eq!(stats.this_week, 1);
    assert_eq!(stats.by_status[&ApplicationStatus::Pending], 3);
    assert_eq!(stats.by_status[&ApplicationStatus::Cancelled], 0);
    assert_eq!(stats.by_type[&ApplicationType::SchoolFees], 2);
    assert_eq!(stats.by_type[&ApplicationType::SchoolSupport], 0);
    assert_eq!(stats.by_priority[&Priority::Urgent], 1);
    assert_eq!(stats.by_priority.len(), 4);
}

#[test]
fn follow_ups_and_overdue_use_the_clock() {
    let harness = harness();
    let follow_up = harness.submit(school_fees_payload());
    let delayed = harness.submit(orphanage_payload());

    harness.review(
        &follow_up,
        json!({
            "status": "UNDER_REVIEW",
            "comments": "Need bank statement",
            "followUpRequired": true,
            "followUpDate": "2025-10-20T09:00:00Z"
        }),
    );
    harness.review(
        &delayed,
        json!({
            "status": "APPROVED",
            "comments": "Awaiting disbursement",
            "estimatedCompletionDate": "2025-10-25"
        }),
    );

    assert!(harness.service.follow_ups_due().expect("query").is_empty());
    assert!(harness.service.overdue().expect("query").is_empty());

    harness
        .clock
        .set(Utc.with_ymd_and_hms(2025, 10, 26, 0, 0, 0).unwrap());
    let due = harness.service.follow_ups_due().expect("query");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, follow_up.id);
    let overdue = harness.service.overdue().expect("query");
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, delayed.id);

    harness.review(&delayed, json!({ "status": "COMPLETED", "comments": "Done" }));
    assert!(harness.service.overdue().expect("query").is_empty());
}

#[test]
fn store_failures_surface_as_store_errors() {
    use std::sync::Arc;

    use crate::workflows::grants::{
        GrantApplicationService, InMemoryUserDirectory, ManualClock, NotificationDispatcher,
    };

    let users = Arc::new(InMemoryUserDirectory::with_users(accounts()));
    let (dispatcher, _worker) =
        NotificationDispatcher::channel(users.clone(), Arc::new(RecordingMailer::default()));
    let service = GrantApplicationService::with_clock(
        Arc::new(UnavailableRepository),
        users,
        dispatcher,
        Arc::new(ManualClock::new(now())),
    );
    let submission = validate_creation(&school_fees_payload(), now()).expect("valid payload");

    match service.submit(&user(APPLICANT), submission) {
        Err(ApplicationServiceError::Store(_)) => {}
        other => panic!("expected store error, got {other:?}"),
    }
}
