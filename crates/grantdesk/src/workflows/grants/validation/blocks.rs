use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::fields::{is_valid_email, Read, Report};
use super::{MAX_REQUESTED_AMOUNT, MAX_SUPPORTING_DOCUMENTS};
use crate::workflows::grants::domain::{
    AcademicInfo, BreakdownLine, DocumentUpload, FinancialInfo, FinancialInfoPatch, GuardianInfo,
    OperationalNeed, OrphanageData, SchoolSupportData, SupportType,
};

type Object = Map<String, Value>;

/// Read a nested object member and run `parse` over it. `missing` is reported when absent.
pub(super) fn required_block<T>(
    report: &mut Report,
    object: &Object,
    key: &str,
    missing: &str,
    parse: impl FnOnce(&Object, &mut Report) -> Option<T>,
) -> Option<T> {
    match report.object(object, key) {
        Read::Value(inner) => parse(inner, report),
        Read::Missing => {
            report.push(missing);
            None
        }
        Read::Invalid => None,
    }
}

/// Like [`required_block`] but absence is not an error.
pub(super) fn optional_block<T>(
    report: &mut Report,
    object: &Object,
    key: &str,
    parse: impl FnOnce(&Object, &mut Report) -> Option<T>,
) -> Read<T> {
    match report.object(object, key) {
        Read::Value(inner) => match parse(inner, report) {
            Some(value) => Read::Value(value),
            None => Read::Invalid,
        },
        Read::Missing => Read::Missing,
        Read::Invalid => Read::Invalid,
    }
}

fn requested_amount(report: &mut Report, amount: f64) -> Option<f64> {
    if amount <= 0.0 {
        report.push("Requested amount must be greater than 0");
        None
    } else if amount > MAX_REQUESTED_AMOUNT {
        report.push("Requested amount cannot exceed 10,000,000");
        None
    } else {
        Some(amount)
    }
}

struct FinancialExtras {
    breakdown: Read<Vec<BreakdownLine>>,
    total_family_income: Option<f64>,
    number_of_dependents: Option<u32>,
}

fn financial_extras(object: &Object, report: &mut Report) -> FinancialExtras {
    let breakdown = match report.array(object, "breakdown", "breakdown must be a list") {
        Read::Value(items) => match breakdown_lines(items, report) {
            Some(lines) => Read::Value(lines),
            None => Read::Invalid,
        },
        Read::Missing => Read::Missing,
        Read::Invalid => Read::Invalid,
    };
    let number_of_dependents = report
        .count(
            object,
            "numberOfDependents",
            "Number of dependents cannot be negative",
        )
        .value();
    let total_family_income = report.non_negative_amount(
        object,
        "totalFamilyIncome",
        "Total family income cannot be negative",
    );

    FinancialExtras {
        breakdown,
        total_family_income,
        number_of_dependents,
    }
}

fn breakdown_lines(items: &[Value], report: &mut Report) -> Option<Vec<BreakdownLine>> {
    let mut lines = Vec::with_capacity(items.len());
    let mut clean = true;
    for (index, item) in items.iter().enumerate() {
        let position = index + 1;
        let Some(line) = item.as_object() else {
            report.push(format!("Breakdown line {position} must be an object"));
            clean = false;
            continue;
        };
        let label = report.required_text(
            line,
            "item",
            &format!("Breakdown item is required for line {position}"),
        );
        let amount = match report.number(line, "amount") {
            Read::Value(amount) if amount < 0.0 => {
                report.push(format!(
                    "Breakdown amount cannot be negative for line {position}"
                ));
                None
            }
            Read::Value(amount) => Some(amount),
            Read::Missing => {
                report.push(format!("Breakdown amount is required for line {position}"));
                None
            }
            Read::Invalid => None,
        };
        let description = report.optional_text(line, "description");
        match (label, amount) {
            (Some(item), Some(amount)) => lines.push(BreakdownLine {
                item,
                amount,
                description,
            }),
            _ => clean = false,
        }
    }
    clean.then_some(lines)
}

pub(super) fn financial_info(object: &Object, report: &mut Report) -> Option<FinancialInfo> {
    let requested = match report.number(object, "requestedAmount") {
        Read::Value(amount) => requested_amount(report, amount),
        Read::Missing => {
            report.push("Requested amount must be greater than 0");
            None
        }
        Read::Invalid => None,
    };
    let currency = report.required_text(object, "currency", "Currency is required");
    let extras = financial_extras(object, report);

    let breakdown = match extras.breakdown {
        Read::Value(lines) => lines,
        Read::Missing => Vec::new(),
        Read::Invalid => return None,
    };
    Some(FinancialInfo {
        requested_amount: requested?,
        currency: currency?,
        breakdown,
        total_family_income: extras.total_family_income,
        number_of_dependents: extras.number_of_dependents,
    })
}

/// Partial financial block for applicant updates; every member is optional.
pub(super) fn financial_patch(object: &Object, report: &mut Report) -> Option<FinancialInfoPatch> {
    let requested_amount = match report.number(object, "requestedAmount") {
        Read::Value(amount) => requested_amount(report, amount),
        Read::Missing | Read::Invalid => None,
    };
    let currency = match report.text(object, "currency") {
        Read::Value(currency) if currency.is_empty() => {
            report.push("Currency cannot be empty");
            None
        }
        other => other.value(),
    };
    let extras = financial_extras(object, report);

    Some(FinancialInfoPatch {
        requested_amount,
        currency,
        breakdown: extras.breakdown.value(),
        total_family_income: extras.total_family_income,
        number_of_dependents: extras.number_of_dependents,
    })
}

pub(super) fn academic_info(object: &Object, report: &mut Report) -> Option<AcademicInfo> {
    let school_name = report.required_text(object, "schoolName", "School name is required");
    let school_address =
        report.required_text(object, "schoolAddress", "School address is required");
    let student_class = report.required_text(object, "studentClass", "Student class is required");
    let academic_year = report.required_text(object, "academicYear", "Academic year is required");
    let principal_name = report.optional_text(object, "principalName");
    let school_phone_number = report.optional_text(object, "schoolPhoneNumber");
    let school_email = match report.optional_text(object, "schoolEmail") {
        Some(email) if !is_valid_email(&email) => {
            report.push("Invalid school email format");
            None
        }
        other => other,
    };

    Some(AcademicInfo {
        school_name: school_name?,
        school_address: school_address?,
        student_class: student_class?,
        academic_year: academic_year?,
        principal_name,
        school_phone_number,
        school_email: school_email.map(|email| email.to_lowercase()),
    })
}

pub(super) fn school_support_data(
    object: &Object,
    now: DateTime<Utc>,
    report: &mut Report,
) -> Option<SchoolSupportData> {
    const NO_SUPPORT_TYPE: &str = "At least one support type is required";
    let support_type = match report.array(object, "supportType", NO_SUPPORT_TYPE) {
        Read::Value(items) if !items.is_empty() => {
            report.labels::<SupportType>(items, "support type")
        }
        Read::Value(_) | Read::Missing => {
            report.push(NO_SUPPORT_TYPE);
            None
        }
        Read::Invalid => None,
    };

    const TOO_FEW_STUDENTS: &str = "Number of students must be at least 1";
    let number_of_students = at_least_one(
        report.count(object, "numberOfStudents", TOO_FEW_STUDENTS),
        report,
        TOO_FEW_STUDENTS,
    );
    let duration_needed =
        report.required_text(object, "durationNeeded", "Duration needed is required");
    let specific_needs = report.required_text(
        object,
        "specificNeeds",
        "Specific needs description is required",
    );
    let preferred_start_date = match report.date(object, "preferredStartDate") {
        Read::Value(date) if date.date_naive() < now.date_naive() => {
            report.push("Preferred start date cannot be in the past");
            None
        }
        Read::Value(date) => Some(date),
        Read::Missing => {
            report.push("Preferred start date is required");
            None
        }
        Read::Invalid => None,
    };

    Some(SchoolSupportData {
        support_type: support_type?,
        number_of_students: number_of_students?,
        duration_needed: duration_needed?,
        specific_needs: specific_needs?,
        preferred_start_date: preferred_start_date?,
    })
}

pub(super) fn orphanage_data(object: &Object, report: &mut Report) -> Option<OrphanageData> {
    let orphanage_name =
        report.required_text(object, "orphanageName", "Orphanage name is required");
    let registration_number = report.required_text(
        object,
        "registrationNumber",
        "Registration number is required",
    );
    let director_name = report.required_text(object, "directorName", "Director name is required");

    const TOO_FEW_CHILDREN: &str = "Number of children must be at least 1";
    let number_of_children = at_least_one(
        report.count(object, "numberOfChildren", TOO_FEW_CHILDREN),
        report,
        TOO_FEW_CHILDREN,
    );
    let age_range = report.required_text(object, "ageRange", "Age range is required");

    const NO_NEEDS: &str = "At least one operational need is required";
    let operational_needs = match report.array(object, "operationalNeeds", NO_NEEDS) {
        Read::Value(items) if !items.is_empty() => {
            report.labels::<OperationalNeed>(items, "operational need")
        }
        Read::Value(_) | Read::Missing => {
            report.push(NO_NEEDS);
            None
        }
        Read::Invalid => None,
    };

    let monthly_operating_cost = match report.number(object, "monthlyOperatingCost") {
        Read::Value(cost) if cost < 0.0 => {
            report.push("Monthly operating cost must be 0 or greater");
            None
        }
        Read::Value(cost) => Some(cost),
        Read::Missing => {
            report.push("Monthly operating cost is required");
            None
        }
        Read::Invalid => None,
    };
    let staff_count = match report.count(object, "staffCount", "Staff count cannot be negative") {
        Read::Value(count) => Some(count),
        Read::Missing => {
            report.push("Staff count is required");
            None
        }
        Read::Invalid => None,
    };
    let facility_description = report.required_text(
        object,
        "facilityDescription",
        "Facility description is required",
    );

    Some(OrphanageData {
        orphanage_name: orphanage_name?,
        registration_number: registration_number?,
        director_name: director_name?,
        number_of_children: number_of_children?,
        age_range: age_range?,
        operational_needs: operational_needs?,
        monthly_operating_cost: monthly_operating_cost?,
        staff_count: staff_count?,
        facility_description: facility_description?,
    })
}

pub(super) fn guardian_info(object: &Object, report: &mut Report) -> Option<GuardianInfo> {
    let guardian_name = report.required_text(
        object,
        "guardianName",
        "Guardian name is required when guardian info is provided",
    );
    let relationship =
        report.required_text(object, "relationship", "Guardian relationship is required");
    let guardian_phone =
        report.required_text(object, "guardianPhone", "Guardian phone is required");
    let guardian_email = match report.optional_text(object, "guardianEmail") {
        Some(email) if !is_valid_email(&email) => {
            report.push("Invalid guardian email format");
            None
        }
        other => other,
    };
    let guardian_address = report.optional_text(object, "guardianAddress");
    let occupation = report.optional_text(object, "occupation");
    let monthly_income = report.non_negative_amount(
        object,
        "monthlyIncome",
        "Guardian monthly income cannot be negative",
    );

    Some(GuardianInfo {
        guardian_name: guardian_name?,
        relationship: relationship?,
        guardian_phone: guardian_phone?,
        guardian_email: guardian_email.map(|email| email.to_lowercase()),
        guardian_address,
        occupation,
        monthly_income,
    })
}

pub(super) fn supporting_documents(
    items: &[Value],
    report: &mut Report,
) -> Option<Vec<DocumentUpload>> {
    if items.len() > MAX_SUPPORTING_DOCUMENTS {
        report.push("Maximum 10 supporting documents allowed");
        return None;
    }

    let mut documents = Vec::with_capacity(items.len());
    let mut clean = true;
    for (index, item) in items.iter().enumerate() {
        let position = index + 1;
        let Some(document) = item.as_object() else {
            report.push(format!("Supporting document {position} must be an object"));
            clean = false;
            continue;
        };
        let document_type = report.required_text(
            document,
            "documentType",
            &format!("Document type is required for supporting document {position}"),
        );
        let document_url = report.required_text(
            document,
            "documentUrl",
            &format!("Document URL is required for supporting document {position}"),
        );
        let document_name = report.required_text(
            document,
            "documentName",
            &format!("Document name is required for supporting document {position}"),
        );
        let uploaded_at = report.date(document, "uploadedAt");
        let uploaded_at = match uploaded_at {
            Read::Invalid => {
                clean = false;
                None
            }
            other => other.value(),
        };
        match (document_type, document_url, document_name) {
            (Some(document_type), Some(document_url), Some(document_name)) => {
                documents.push(DocumentUpload {
                    document_type,
                    document_url,
                    document_name,
                    uploaded_at,
                })
            }
            _ => clean = false,
        }
    }
    clean.then_some(documents)
}

fn at_least_one(read: Read<u32>, report: &mut Report, message: &str) -> Option<u32> {
    match read {
        Read::Value(count) if count >= 1 => Some(count),
        Read::Value(_) | Read::Missing => {
            report.push(message);
            None
        }
        Read::Invalid => None,
    }
}
