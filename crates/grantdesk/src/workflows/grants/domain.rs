use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for stored applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a user account in the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-facing application number, e.g. `SF2025100001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationNumber(pub String);

impl fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a wire label does not name a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }

            pub const fn ordered() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok(Self::$variant),)+
                    _ => Err(UnknownLabel {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

/// The three grant programs an application can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationType {
    SchoolFees,
    SchoolSupport,
    OrphanageDonation,
}

wire_enum!(ApplicationType, "application type", {
    SchoolFees => "SCHOOL_FEES",
    SchoolSupport => "SCHOOL_SUPPORT",
    OrphanageDonation => "ORPHANAGE_DONATION",
});

impl ApplicationType {
    /// Two-letter prefix used when composing application numbers.
    pub const fn number_prefix(self) -> &'static str {
        match self {
            Self::SchoolFees => "SF",
            Self::SchoolSupport => "SS",
            Self::OrphanageDonation => "OD",
        }
    }

    pub const fn requires_academic_info(self) -> bool {
        matches!(self, Self::SchoolFees | Self::SchoolSupport)
    }
}

/// Lifecycle stage of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

wire_enum!(ApplicationStatus, "status", {
    Pending => "PENDING",
    UnderReview => "UNDER_REVIEW",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl ApplicationStatus {
    pub const TERMINAL: [Self; 3] = [Self::Completed, Self::Rejected, Self::Cancelled];

    /// Statuses an applicant may still cancel from.
    pub const CANCELLABLE: [Self; 3] = [Self::Pending, Self::UnderReview, Self::Approved];

    /// Statuses shown in the admin review queue.
    pub const AWAITING_REVIEW: [Self; 2] = [Self::Pending, Self::UnderReview];

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }
}

/// Triage priority assigned at submission.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

wire_enum!(Priority, "priority", {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Urgent => "URGENT",
});

/// Kinds of help a school support request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportType {
    Housing,
    Feeding,
    Books,
    Supplies,
    Uniform,
    Transportation,
}

wire_enum!(SupportType, "support type", {
    Housing => "housing",
    Feeding => "feeding",
    Books => "books",
    Supplies => "supplies",
    Uniform => "uniform",
    Transportation => "transportation",
});

/// Running costs an orphanage can request help with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalNeed {
    Food,
    Clothing,
    Medical,
    Education,
    Utilities,
    Maintenance,
}

wire_enum!(OperationalNeed, "operational need", {
    Food => "food",
    Clothing => "clothing",
    Medical => "medical",
    Education => "education",
    Utilities => "utilities",
    Maintenance => "maintenance",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicInfo {
    pub school_name: String,
    pub school_address: String,
    pub student_class: String,
    pub academic_year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownLine {
    pub item: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialInfo {
    pub requested_amount: f64,
    pub currency: String,
    #[serde(default)]
    pub breakdown: Vec<BreakdownLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_family_income: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_dependents: Option<u32>,
}

/// Partial financial update; only present fields replace stored values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialInfoPatch {
    pub requested_amount: Option<f64>,
    pub currency: Option<String>,
    pub breakdown: Option<Vec<BreakdownLine>>,
    pub total_family_income: Option<f64>,
    pub number_of_dependents: Option<u32>,
}

impl FinancialInfoPatch {
    pub fn merge_into(self, target: &mut FinancialInfo) {
        if let Some(amount) = self.requested_amount {
            target.requested_amount = amount;
        }
        if let Some(currency) = self.currency {
            target.currency = currency;
        }
        if let Some(breakdown) = self.breakdown {
            target.breakdown = breakdown;
        }
        if let Some(income) = self.total_family_income {
            target.total_family_income = Some(income);
        }
        if let Some(dependents) = self.number_of_dependents {
            target.number_of_dependents = Some(dependents);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianInfo {
    pub guardian_name: String,
    pub relationship: String,
    pub guardian_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_income: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSupportData {
    pub support_type: Vec<SupportType>,
    pub number_of_students: u32,
    pub duration_needed: String,
    pub specific_needs: String,
    pub preferred_start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanageData {
    pub orphanage_name: String,
    pub registration_number: String,
    pub director_name: String,
    pub number_of_children: u32,
    pub age_range: String,
    pub operational_needs: Vec<OperationalNeed>,
    pub monthly_operating_cost: f64,
    pub staff_count: u32,
    pub facility_description: String,
}

/// Type-conditional payload. The variant is the application type, so a record can never carry
/// a block that does not belong to its program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "applicationType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationDetails {
    #[serde(rename_all = "camelCase")]
    SchoolFees { academic_info: AcademicInfo },
    #[serde(rename_all = "camelCase")]
    SchoolSupport {
        academic_info: AcademicInfo,
        school_support_data: SchoolSupportData,
    },
    #[serde(rename_all = "camelCase")]
    OrphanageDonation { orphanage_data: OrphanageData },
}

impl ApplicationDetails {
    pub const fn application_type(&self) -> ApplicationType {
        match self {
            Self::SchoolFees { .. } => ApplicationType::SchoolFees,
            Self::SchoolSupport { .. } => ApplicationType::SchoolSupport,
            Self::OrphanageDonation { .. } => ApplicationType::OrphanageDonation,
        }
    }

    pub fn academic_info(&self) -> Option<&AcademicInfo> {
        match self {
            Self::SchoolFees { academic_info } | Self::SchoolSupport { academic_info, .. } => {
                Some(academic_info)
            }
            Self::OrphanageDonation { .. } => None,
        }
    }

    pub fn orphanage_data(&self) -> Option<&OrphanageData> {
        match self {
            Self::OrphanageDonation { orphanage_data } => Some(orphanage_data),
            _ => None,
        }
    }

    /// Replace the type-specific blocks carried by a patch. Blocks that do not belong to this
    /// variant are ignored; callers check [`DetailsPatch::mismatch`] first.
    pub fn merge(&mut self, patch: DetailsPatch) {
        match self {
            Self::SchoolFees { academic_info } => {
                if let Some(info) = patch.academic_info {
                    *academic_info = info;
                }
            }
            Self::SchoolSupport {
                academic_info,
                school_support_data,
            } => {
                if let Some(info) = patch.academic_info {
                    *academic_info = info;
                }
                if let Some(data) = patch.school_support_data {
                    *school_support_data = data;
                }
            }
            Self::OrphanageDonation { orphanage_data } => {
                if let Some(data) = patch.orphanage_data {
                    *orphanage_data = data;
                }
            }
        }
    }
}

/// Type-specific blocks supplied in an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailsPatch {
    pub academic_info: Option<AcademicInfo>,
    pub school_support_data: Option<SchoolSupportData>,
    pub orphanage_data: Option<OrphanageData>,
}

impl DetailsPatch {
    pub fn is_empty(&self) -> bool {
        self.academic_info.is_none()
            && self.school_support_data.is_none()
            && self.orphanage_data.is_none()
    }

    /// Name of the first block that does not apply to `application_type`.
    pub fn mismatch(&self, application_type: ApplicationType) -> Option<&'static str> {
        if self.academic_info.is_some() && !application_type.requires_academic_info() {
            return Some("academicInfo");
        }
        if self.school_support_data.is_some() && application_type != ApplicationType::SchoolSupport
        {
            return Some("schoolSupportData");
        }
        if self.orphanage_data.is_some() && application_type != ApplicationType::OrphanageDonation
        {
            return Some("orphanageData");
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingDocument {
    pub document_type: String,
    pub document_url: String,
    pub document_name: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Document reference as submitted; the upload time defaults to the submission time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub document_type: String,
    pub document_url: String,
    pub document_name: String,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl DocumentUpload {
    pub fn into_document(self, now: DateTime<Utc>) -> SupportingDocument {
        SupportingDocument {
            document_type: self.document_type,
            document_url: self.document_url,
            document_name: self.document_name,
            uploaded_at: self.uploaded_at.unwrap_or(now),
        }
    }
}

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventKind {
    StatusChange,
    Assignment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: ApplicationStatus,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub kind: HistoryEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationReview {
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    pub comments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    pub follow_up_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<DateTime<Utc>>,
}

/// Stored grant application.
///
/// `status`, `status_history`, `reviews`, and `assigned_to` only change through
/// [`ApplicationMutation`], which keeps the audit trail in step with the scalar fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub applicant_id: UserId,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_reason: Option<String>,
    #[serde(flatten)]
    pub details: ApplicationDetails,
    pub financial_info: FinancialInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_info: Option<GuardianInfo>,
    #[serde(default)]
    pub supporting_documents: Vec<SupportingDocument>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: ApplicationStatus,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_completion_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default)]
    pub reviews: Vec<ApplicationReview>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Application {
    pub const fn application_type(&self) -> ApplicationType {
        self.details.application_type()
    }

    /// The most recent review; always the last element of `reviews`.
    pub fn current_review(&self) -> Option<&ApplicationReview> {
        self.reviews.last()
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.applicant_id == user
    }

    /// Case-insensitive match against the number, title, description, and institution names.
    pub fn matches_search(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        let mut haystacks = vec![
            self.application_number.0.as_str(),
            self.title.as_str(),
            self.description.as_str(),
        ];
        if let Some(academic) = self.details.academic_info() {
            haystacks.push(academic.school_name.as_str());
        }
        if let Some(orphanage) = self.details.orphanage_data() {
            haystacks.push(orphanage.orphanage_name.as_str());
        }
        haystacks
            .into_iter()
            .any(|value| value.to_lowercase().contains(&needle))
    }
}

/// Validated creation payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub title: String,
    pub description: String,
    pub urgency_reason: Option<String>,
    pub details: ApplicationDetails,
    pub financial_info: FinancialInfo,
    pub guardian_info: Option<GuardianInfo>,
    pub supporting_documents: Vec<DocumentUpload>,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
}

impl NewApplication {
    pub const fn application_type(&self) -> ApplicationType {
        self.details.application_type()
    }
}

/// Validated partial update supplied by the applicant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub urgency_reason: Option<String>,
    pub financial_info: Option<FinancialInfoPatch>,
    pub guardian_info: Option<GuardianInfo>,
    pub details: DetailsPatch,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
}

impl ApplicationPatch {
    fn merge_into(self, application: &mut Application) {
        if let Some(title) = self.title {
            application.title = title;
        }
        if let Some(description) = self.description {
            application.description = description;
        }
        if let Some(reason) = self.urgency_reason {
            application.urgency_reason = Some(reason);
        }
        if let Some(financial) = self.financial_info {
            financial.merge_into(&mut application.financial_info);
        }
        if let Some(guardian) = self.guardian_info {
            application.guardian_info = Some(guardian);
        }
        if !self.details.is_empty() {
            application.details.merge(self.details);
        }
        if let Some(priority) = self.priority {
            application.priority = priority;
        }
        if let Some(tags) = self.tags {
            application.tags = tags;
        }
    }
}

/// Validated admin review decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDecision {
    pub status: ApplicationStatus,
    pub comments: String,
    pub internal_notes: Option<String>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
}

/// Validated bulk status change.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkStatusUpdate {
    pub application_ids: Vec<ApplicationId>,
    pub status: ApplicationStatus,
    pub reason: Option<String>,
}

/// A status change recorded in the history alongside the new status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub status: ApplicationStatus,
    pub changed_by: UserId,
    pub reason: Option<String>,
}

/// Reassignment recorded in the history without changing the status.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub assignee: UserId,
    pub assigned_by: UserId,
}

/// One atomic change to a stored application: scalar sets plus history/review pushes.
///
/// Stores apply the whole mutation under a single write so the audit trail can never drift from
/// the fields it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationMutation {
    pub at: DateTime<Utc>,
    pub transition: Option<StatusTransition>,
    pub review: Option<ApplicationReview>,
    pub assignment: Option<Assignment>,
    pub patch: Option<ApplicationPatch>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
    pub actual_completion_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub soft_delete: bool,
}

impl ApplicationMutation {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at,
            transition: None,
            review: None,
            assignment: None,
            patch: None,
            estimated_completion_date: None,
            actual_completion_date: None,
            rejection_reason: None,
            soft_delete: false,
        }
    }

    pub fn with_transition(mut self, transition: StatusTransition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn with_patch(mut self, patch: ApplicationPatch) -> Self {
        self.patch = Some(patch);
        self
    }

    pub fn apply_to(self, application: &mut Application) {
        if let Some(patch) = self.patch {
            patch.merge_into(application);
        }

        if let Some(review) = self.review {
            application.reviews.push(review);
        }

        if let Some(transition) = self.transition {
            application.status = transition.status;
            application.status_history.push(StatusHistoryEntry {
                status: transition.status,
                changed_by: transition.changed_by,
                changed_at: self.at,
                reason: transition.reason,
                kind: HistoryEventKind::StatusChange,
            });
        }

        if let Some(assignment) = self.assignment {
            let reason = format!("Assigned to user {}", assignment.assignee);
            application.assigned_to = Some(assignment.assignee);
            application.status_history.push(StatusHistoryEntry {
                status: application.status,
                changed_by: assignment.assigned_by,
                changed_at: self.at,
                reason: Some(reason),
                kind: HistoryEventKind::Assignment,
            });
        }

        if let Some(date) = self.estimated_completion_date {
            application.estimated_completion_date = Some(date);
        }
        if let Some(date) = self.actual_completion_date {
            application.actual_completion_date = Some(date);
        }
        if let Some(reason) = self.rejection_reason {
            application.rejection_reason = Some(reason);
        }

        if self.soft_delete {
            application.is_deleted = true;
            application.deleted_at = Some(self.at);
        }

        application.last_updated_at = self.at;
    }
}

/// Counter scope for application numbers: one sequence per type per calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumberingScope {
    pub application_type: ApplicationType,
    pub year: i32,
    pub month: u32,
}

impl NumberingScope {
    pub fn for_submission(application_type: ApplicationType, submitted_at: DateTime<Utc>) -> Self {
        Self {
            application_type,
            year: submitted_at.year(),
            month: submitted_at.month(),
        }
    }

    /// `{prefix}{YYYY}{MM}`, the part every number in this scope starts with.
    pub fn stem(&self) -> String {
        format!(
            "{}{:04}{:02}",
            self.application_type.number_prefix(),
            self.year,
            self.month
        )
    }

    pub fn number(&self, sequence: u32) -> ApplicationNumber {
        ApplicationNumber(format!("{}{:04}", self.stem(), sequence))
    }
}
