use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::blocks::{
    academic_info, financial_info, financial_patch, guardian_info, optional_block, orphanage_data,
    required_block, school_support_data, supporting_documents,
};
use super::fields::{Read, Report};
use super::{as_object, ValidationFailure, MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS};
use crate::workflows::grants::domain::{
    ApplicationDetails, ApplicationPatch, ApplicationType, DetailsPatch, NewApplication, Priority,
};

const TYPE_BLOCKS: [&str; 3] = ["academicInfo", "schoolSupportData", "orphanageData"];

/// Validate a submission payload.
pub fn validate_creation(
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<NewApplication, ValidationFailure> {
    let object = as_object(payload)?;
    let mut report = Report::default();

    let application_type = match report.label::<ApplicationType>(
        object,
        "applicationType",
        "Invalid application type",
    ) {
        Read::Value(kind) => Some(kind),
        Read::Missing => {
            report.push("Application type is required");
            None
        }
        Read::Invalid => None,
    };

    let title = report.required_text(object, "title", "Title is required");
    let title = report.limit_length(
        title,
        MAX_TITLE_CHARS,
        "Title must be less than 200 characters",
    );
    let description = report.required_text(object, "description", "Description is required");
    let description = report.limit_length(
        description,
        MAX_DESCRIPTION_CHARS,
        "Description must be less than 2000 characters",
    );
    let urgency_reason = report.optional_text(object, "urgencyReason");

    let financial_info = required_block(
        &mut report,
        object,
        "financialInfo",
        "Financial information is required",
        financial_info,
    );
    let priority = report
        .label::<Priority>(object, "priority", "Invalid priority level")
        .value();

    let details = application_type.and_then(|kind| details_for(kind, object, now, &mut report));

    let guardian_info = optional_block(&mut report, object, "guardianInfo", guardian_info);
    let supporting_documents = match report.array(
        object,
        "supportingDocuments",
        "supportingDocuments must be a list",
    ) {
        Read::Value(items) => supporting_documents(items, &mut report),
        Read::Missing => Some(Vec::new()),
        Read::Invalid => None,
    };
    let tags = report.string_list(object, "tags");

    match (title, description, financial_info, details, supporting_documents) {
        (
            Some(title),
            Some(description),
            Some(financial_info),
            Some(details),
            Some(supporting_documents),
        ) if report.is_clean() => Ok(NewApplication {
            title,
            description,
            urgency_reason,
            details,
            financial_info,
            guardian_info: guardian_info.value(),
            supporting_documents,
            priority,
            tags: tags.value().unwrap_or_default(),
        }),
        _ => Err(report.into_failure()),
    }
}

fn details_for(
    application_type: ApplicationType,
    object: &Map<String, Value>,
    now: DateTime<Utc>,
    report: &mut Report,
) -> Option<ApplicationDetails> {
    let own_blocks: &[&str] = match application_type {
        ApplicationType::SchoolFees => &["academicInfo"],
        ApplicationType::SchoolSupport => &["academicInfo", "schoolSupportData"],
        ApplicationType::OrphanageDonation => &["orphanageData"],
    };
    let mut foreign = false;
    for block in TYPE_BLOCKS {
        if !own_blocks.contains(&block) && object.get(block).is_some_and(|v| !v.is_null()) {
            report.push(format!(
                "{block} is not allowed for {application_type} applications"
            ));
            foreign = true;
        }
    }

    let academic = |report: &mut Report| {
        required_block(
            report,
            object,
            "academicInfo",
            "Academic information is required for school-related applications",
            academic_info,
        )
    };

    let details = match application_type {
        ApplicationType::SchoolFees => ApplicationDetails::SchoolFees {
            academic_info: academic(report)?,
        },
        ApplicationType::SchoolSupport => {
            let academic_info = academic(report);
            let school_support_data = required_block(
                report,
                object,
                "schoolSupportData",
                "School support data is required",
                |inner, report| school_support_data(inner, now, report),
            );
            ApplicationDetails::SchoolSupport {
                academic_info: academic_info?,
                school_support_data: school_support_data?,
            }
        }
        ApplicationType::OrphanageDonation => ApplicationDetails::OrphanageDonation {
            orphanage_data: required_block(
                report,
                object,
                "orphanageData",
                "Orphanage data is required for orphanage donation applications",
                orphanage_data,
            )?,
        },
    };
    (!foreign).then_some(details)
}

/// Validate an applicant's partial update. Only members present in the payload are checked;
/// nested blocks other than `financialInfo` must be complete.
pub fn validate_update(
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<ApplicationPatch, ValidationFailure> {
    let object = as_object(payload)?;
    let mut report = Report::default();

    if object.get("applicationType").is_some_and(|v| !v.is_null()) {
        report.push("Application type cannot be changed");
    }

    let title = match report.text(object, "title") {
        Read::Value(title) if title.is_empty() => {
            report.push("Title cannot be empty");
            None
        }
        other => other.value(),
    };
    let title = report.limit_length(
        title,
        MAX_TITLE_CHARS,
        "Title must be less than 200 characters",
    );
    let description = match report.text(object, "description") {
        Read::Value(description) if description.is_empty() => {
            report.push("Description cannot be empty");
            None
        }
        other => other.value(),
    };
    let description = report.limit_length(
        description,
        MAX_DESCRIPTION_CHARS,
        "Description must be less than 2000 characters",
    );
    let urgency_reason = report.optional_text(object, "urgencyReason");

    let financial_info = optional_block(&mut report, object, "financialInfo", financial_patch);
    let guardian_info = optional_block(&mut report, object, "guardianInfo", guardian_info);
    let details = DetailsPatch {
        academic_info: optional_block(&mut report, object, "academicInfo", academic_info).value(),
        school_support_data: optional_block(
            &mut report,
            object,
            "schoolSupportData",
            |inner, report| school_support_data(inner, now, report),
        )
        .value(),
        orphanage_data: optional_block(&mut report, object, "orphanageData", orphanage_data)
            .value(),
    };
    let priority = report
        .label::<Priority>(object, "priority", "Invalid priority level")
        .value();
    let tags = report.string_list(object, "tags").value();

    if !report.is_clean() {
        return Err(report.into_failure());
    }

    Ok(ApplicationPatch {
        title,
        description,
        urgency_reason,
        financial_info: financial_info.value(),
        guardian_info: guardian_info.value(),
        details,
        priority,
        tags,
    })
}
