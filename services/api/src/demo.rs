use crate::infra::OutboxMailer;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use grantdesk::error::AppError;
use grantdesk::workflows::grants::validation::{parse_date, validate_creation, validate_review};
use grantdesk::workflows::grants::{
    GrantApplicationService, InMemoryApplicationStore, InMemoryUserDirectory,
    ManualClock, NotificationDispatcher, UserAccount, UserId, UserRole,
};
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

const APPLICANT: &str = "demo-applicant";
const REVIEWER: &str = "demo-reviewer";
const DIRECTOR: &str = "demo-director";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Pin the demo clock (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = parse_as_of)]
    pub(crate) as_of: Option<DateTime<Utc>>,
    /// Print the HTML body of every notification email.
    #[arg(long)]
    pub(crate) show_emails: bool,
}

fn parse_as_of(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_date(raw).ok_or_else(|| format!("failed to parse '{raw}' as RFC 3339 or YYYY-MM-DD"))
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let start = args.as_of.unwrap_or_else(Utc::now);
    println!(
        "Grant application lifecycle demo ({})",
        start.format("%Y-%m-%d %H:%M UTC")
    );

    if let Err(err) = walk_through(start, args.show_emails) {
        println!("  Demo stopped: {err}");
    }
    Ok(())
}

fn demo_users() -> Vec<UserAccount> {
    let account = |id: &str, email: &str, role: UserRole| UserAccount {
        id: UserId(id.to_string()),
        email: email.to_string(),
        role,
        is_active: true,
        email_verified: true,
    };
    vec![
        account(APPLICANT, "applicant@grantdesk.test", UserRole::User),
        account(REVIEWER, "reviewer@grantdesk.test", UserRole::Admin),
        account(DIRECTOR, "director@grantdesk.test", UserRole::SuperAdmin),
    ]
}

fn walk_through(start: DateTime<Utc>, show_emails: bool) -> Result<(), Box<dyn Error>> {
    let users = Arc::new(InMemoryUserDirectory::with_users(demo_users()));
    let outbox = OutboxMailer::default();
    let (dispatcher, mut worker) =
        NotificationDispatcher::channel(users.clone(), Arc::new(outbox.clone()));
    let clock = Arc::new(ManualClock::new(start));
    let service = GrantApplicationService::with_clock(
        Arc::new(InMemoryApplicationStore::new()),
        users,
        dispatcher,
        clock.clone(),
    );
    let applicant = UserId(APPLICANT.to_string());
    let reviewer = UserId(REVIEWER.to_string());

    println!("\nSubmissions");
    let mut submitted = Vec::new();
    for payload in sample_payloads(start) {
        let application = service.submit(&applicant, validate_creation(&payload, start)?)?;
        println!(
            "- {} {} \"{}\" ({} {}) priority {}",
            application.application_number,
            application.application_type(),
            application.title,
            application.financial_info.currency,
            application.financial_info.requested_amount,
            application.priority
        );
        submitted.push(application);
    }
    let [fees, support, orphanage] = <[_; 3]>::try_from(submitted)
        .map_err(|_| "expected three sample submissions")?;

    println!("\nReviews");
    let incomplete = validate_review(
        &json!({ "status": "REJECTED", "comments": "Bank statement missing" }),
        start,
    );
    if let Err(failure) = incomplete {
        println!("- Rejection without a reason refused: {}", failure.errors.join("; "));
    }

    clock.advance(Duration::hours(3));
    let decision = validate_review(
        &json!({
            "status": "APPROVED",
            "comments": "Fees confirmed with the bursar",
            "internalNotes": "Pay directly to the school account",
            "estimatedCompletionDate": (start + Duration::days(5)).to_rfc3339()
        }),
        service.now(),
    )?;
    let fees = service.review(&fees.id, &reviewer, decision)?;
    println!(
        "- {} -> {} (expected completion {})",
        fees.application_number,
        fees.status,
        fees.estimated_completion_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    );

    let decision = validate_review(
        &json!({
            "status": "UNDER_REVIEW",
            "comments": "Site visit scheduled",
            "followUpRequired": true,
            "followUpDate": (start + Duration::days(2)).to_rfc3339()
        }),
        service.now(),
    )?;
    let orphanage = service.review(&orphanage.id, &reviewer, decision)?;
    let orphanage = service.assign(&orphanage.id, &UserId(DIRECTOR.to_string()), &reviewer)?;
    println!(
        "- {} -> {} assigned to {}",
        orphanage.application_number,
        orphanage.status,
        orphanage
            .assigned_to
            .as_ref()
            .map(|user| user.0.as_str())
            .unwrap_or("nobody")
    );

    let support = service.applicant_cancel(
        &support.id,
        &applicant,
        Some("Covered by the state feeding programme".to_string()),
    )?;
    println!("- {} -> {} by applicant", support.application_number, support.status);

    println!("\nReview queue");
    for application in service.pending(None)? {
        println!(
            "- [{}] {} {}",
            application.priority, application.application_number, application.status
        );
    }

    let stats = service.stats()?;
    println!("\nStatistics: {} total, {} this week", stats.total, stats.this_week);
    for (status, count) in &stats.by_status {
        if *count > 0 {
            println!("  - {status}: {count}");
        }
    }

    clock.advance(Duration::days(6));
    println!("\nSix days later ({})", service.now().format("%Y-%m-%d"));
    for application in service.follow_ups_due()? {
        println!("- follow-up due: {}", application.application_number);
    }
    for application in service.overdue()? {
        println!(
            "- overdue: {} ({})",
            application.application_number, application.status
        );
    }

    let report = worker.drain();
    println!("\nNotifications: {} sent, {} failed", report.sent, report.failed);
    for email in outbox.take() {
        println!("- to {}: {}", email.to, email.subject);
        if show_emails {
            println!("{}\n", email.html_body);
        }
    }

    Ok(())
}

fn sample_payloads(now: DateTime<Utc>) -> [Value; 3] {
    let academic = json!({
        "schoolName": "Ridgeview Secondary School",
        "schoolAddress": "18 Hospital Road, Enugu",
        "studentClass": "SS2",
        "academicYear": "2025/2026",
        "principalName": "Mrs. Eze"
    });
    [
        json!({
            "applicationType": "SCHOOL_FEES",
            "title": "Second term tuition",
            "description": "Tuition and exam fees for an SS2 student.",
            "financialInfo": {
                "requestedAmount": 85000,
                "currency": "NGN",
                "breakdown": [
                    { "item": "Tuition", "amount": 70000 },
                    { "item": "Exam fees", "amount": 15000 }
                ]
            },
            "academicInfo": academic.clone(),
            "guardianInfo": {
                "guardianName": "Ngozi Okeke",
                "relationship": "Aunt",
                "guardianPhone": "+2348030000000"
            }
        }),
        json!({
            "applicationType": "SCHOOL_SUPPORT",
            "title": "Textbooks for the science class",
            "description": "Chemistry and physics textbooks for 35 students.",
            "priority": "HIGH",
            "financialInfo": { "requestedAmount": 420000, "currency": "NGN" },
            "academicInfo": academic,
            "schoolSupportData": {
                "supportType": ["books"],
                "numberOfStudents": 35,
                "durationNeeded": "One academic year",
                "specificNeeds": "Two textbooks per student",
                "preferredStartDate": (now + Duration::days(14)).format("%Y-%m-%d").to_string()
            }
        }),
        json!({
            "applicationType": "ORPHANAGE_DONATION",
            "title": "Water borehole repair",
            "description": "The home's only borehole pump has failed.",
            "priority": "URGENT",
            "urgencyReason": "No running water for 40 children",
            "financialInfo": { "requestedAmount": 1250000, "currency": "NGN" },
            "orphanageData": {
                "orphanageName": "Little Lights Home",
                "registrationNumber": "EN-ORP-0192",
                "directorName": "Pastor Udeh",
                "numberOfChildren": 40,
                "ageRange": "2-17",
                "operationalNeeds": ["maintenance", "utilities"],
                "monthlyOperatingCost": 600000,
                "staffCount": 9,
                "facilityDescription": "Dormitory block with kitchen and borehole"
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sample_payloads_validate() {
        let now = Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap();
        for payload in sample_payloads(now) {
            validate_creation(&payload, now).expect("sample payload validates");
        }
    }

    #[test]
    fn walk_through_completes() {
        let now = Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap();
        walk_through(now, false).expect("demo runs end to end");
    }

    #[test]
    fn as_of_accepts_plain_dates() {
        let parsed = parse_as_of("2025-10-15").expect("date parses");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 10, 15, 0, 0, 0).unwrap());
        assert!(parse_as_of("next tuesday").is_err());
    }
}
