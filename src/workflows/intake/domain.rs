use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(
    /// Identifier for a company tenant.
    CompanyId
);
id_newtype!(
    /// Identifier for one document-collection campaign.
    DashboardId
);
id_newtype!(ApplicantId);
id_newtype!(FormId);
id_newtype!(DocumentId);
id_newtype!(AdminCheckId);
id_newtype!(WorkerDocId);
id_newtype!(ActionId);
id_newtype!(MessageId);
id_newtype!(InviteId);
id_newtype!(UserId);
id_newtype!(
    /// Identity of one counter-delta event, used for idempotent application.
    EventId
);

/// First/last name pair shared across applicant and reviewer records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: String,
    pub last: String,
}

/// Tenant owning dashboards, users, and applicants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub users: Vec<UserId>,
    pub logo: Option<String>,
}

/// Lightweight company reference embedded in denormalized records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRef {
    pub id: CompanyId,
    pub name: String,
}

/// Invitation extended to a prospective applicant; accepting it creates the applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: InviteId,
    pub created_at: DateTime<Utc>,
    pub company: CompanyRef,
    pub dashboard_id: DashboardId,
    pub email: String,
    pub name: Option<PersonName>,
    pub resend: bool,
}

/// Accepted upload formats for a document slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Jpeg,
    Pdf,
}

impl DocFormat {
    pub fn mime(self) -> mime::Mime {
        match self {
            DocFormat::Jpeg => mime::IMAGE_JPEG,
            DocFormat::Pdf => mime::APPLICATION_PDF,
        }
    }

    /// Whether a declared content type is acceptable for this slot format.
    pub fn accepts(self, declared: &str) -> bool {
        declared
            .parse::<mime::Mime>()
            .map(|m| m.essence_str() == self.mime().essence_str())
            .unwrap_or(false)
    }
}

/// Device class recorded on the first page submission of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Mobile,
    Desktop,
}

/// Per-slot requirements a dashboard imposes on submitted documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSpec {
    pub format: DocFormat,
    pub sample: Option<String>,
    pub instructions: Option<String>,
    pub ordinal: u32,
    /// Number of pages a complete submission must carry.
    pub page_count: u32,
    /// Slots with this flag always pass through human review before acceptance.
    pub requires_manual_review: bool,
}

/// Header/caption block rendered at the top of an applicant form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormContent {
    pub header: String,
    pub caption: String,
}

/// Message templates attached to a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardMessages {
    pub opening: String,
}

/// Campaign still under construction; form content and messages may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftDashboard {
    pub id: DashboardId,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub country: String,
    pub job: String,
    pub title: String,
    pub deadline: DateTime<Utc>,
    pub form_content: Option<FormContent>,
    pub docs: BTreeMap<String, DocumentSpec>,
    pub applicants: Vec<ApplicantId>,
    pub messages: Option<DashboardMessages>,
}

/// Live campaign; publishing fixed the form content and opening message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDashboard {
    pub id: DashboardId,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub country: String,
    pub job: String,
    pub title: String,
    pub deadline: DateTime<Utc>,
    pub form_content: FormContent,
    pub docs: BTreeMap<String, DocumentSpec>,
    pub applicants: Vec<ApplicantId>,
    pub messages: DashboardMessages,
    pub published_at: DateTime<Utc>,
    pub counters: DashboardCounters,
}

/// A dashboard is either Draft or Published; the transition is one-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Dashboard {
    Draft(DraftDashboard),
    Published(PublishedDashboard),
}

impl Dashboard {
    pub fn id(&self) -> &DashboardId {
        match self {
            Dashboard::Draft(draft) => &draft.id,
            Dashboard::Published(published) => &published.id,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Dashboard::Published(_))
    }
}

/// Raised when a draft dashboard is published without its required fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("cannot publish dashboard: {missing} is missing or empty")]
    IncompleteSpec { missing: &'static str },
}

impl DraftDashboard {
    /// One-way Draft -> Published transition. Form content and the opening
    /// message become required and frozen; counters start at zero.
    pub fn publish(self, now: DateTime<Utc>) -> Result<PublishedDashboard, PublishError> {
        let form_content = match self.form_content {
            Some(content)
                if !content.header.trim().is_empty() && !content.caption.trim().is_empty() =>
            {
                content
            }
            _ => return Err(PublishError::IncompleteSpec {
                missing: "formContent",
            }),
        };
        let messages = match self.messages {
            Some(messages) if !messages.opening.trim().is_empty() => messages,
            _ => return Err(PublishError::IncompleteSpec {
                missing: "messages.opening",
            }),
        };

        Ok(PublishedDashboard {
            id: self.id,
            created_at: self.created_at,
            created_by: self.created_by,
            country: self.country,
            job: self.job,
            title: self.title,
            deadline: self.deadline,
            form_content,
            docs: self.docs,
            applicants: self.applicants,
            messages,
            published_at: now,
            counters: DashboardCounters::default(),
        })
    }
}

/// Cached aggregate statistics for a published dashboard.
///
/// These mirror applicant/action/message state and are only mutated by the
/// counter engine; `applied_events` is the idempotence ledger for delta
/// application under at-least-once delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCounters {
    pub applicants: u64,
    pub complete_applicants: u64,
    pub incomplete_applicants: u64,
    pub actions: u64,
    pub messages_sent: u64,
    #[serde(default)]
    pub applied_events: BTreeSet<EventId>,
}

/// Rolled-up applicant progress across their required documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicantStatus {
    #[serde(rename = "Not Submitted")]
    NotSubmitted,
    Incomplete,
    Complete,
}

impl ApplicantStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicantStatus::NotSubmitted => "Not Submitted",
            ApplicantStatus::Incomplete => "Incomplete",
            ApplicantStatus::Complete => "Complete",
        }
    }
}

/// Lifecycle of one submitted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStatus {
    #[serde(rename = "Not Submitted")]
    NotSubmitted,
    Submitted,
    Accepted,
    Rejected,
}

impl PageStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PageStatus::NotSubmitted => "Not Submitted",
            PageStatus::Submitted => "Submitted",
            PageStatus::Accepted => "Accepted",
            PageStatus::Rejected => "Rejected",
        }
    }
}

/// Document status derived from page statuses; never written directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[serde(rename = "Not Submitted")]
    NotSubmitted,
    Submitted,
    Accepted,
    Rejected,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::NotSubmitted => "Not Submitted",
            DocumentStatus::Submitted => "Submitted",
            DocumentStatus::Accepted => "Accepted",
            DocumentStatus::Rejected => "Rejected",
        }
    }
}

/// Verdict of the automated pre-check that runs after a page submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemCheckStatus {
    Accepted,
    Rejected,
}

/// Verdict state of a human review, at page, document, and check granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminCheckStatus {
    #[serde(rename = "Not Checked")]
    NotChecked,
    Accepted,
    Rejected,
}

impl AdminCheckStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AdminCheckStatus::NotChecked => "Not Checked",
            AdminCheckStatus::Accepted => "Accepted",
            AdminCheckStatus::Rejected => "Rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, AdminCheckStatus::Accepted | AdminCheckStatus::Rejected)
    }
}

/// Next step the system expects from the applicant for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemTask {
    CreateDoc,
    ResubmitDoc,
    ResubmitPages,
}

/// Delivery state of an outbound applicant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDeliveryStatus {
    Pending,
    Delivered,
    #[serde(rename = "Not Delivered")]
    NotDelivered,
}

impl MessageDeliveryStatus {
    pub const fn is_resolved(self) -> bool {
        !matches!(self, MessageDeliveryStatus::Pending)
    }
}

/// Category of a human work item on an applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    VerifyDocuments,
    MessageNotSent,
}

/// One numbered page inside an applicant's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormPage {
    pub name: String,
    pub page_number: u32,
    pub status: PageStatus,
    /// Strictly increasing; incremented on every (re)submission.
    pub submission_count: u32,
    pub submitted_size: Option<u64>,
    pub submitted_format: Option<String>,
    pub system_check: Option<SystemCheckStatus>,
}

impl FormPage {
    pub fn new(name: impl Into<String>, page_number: u32) -> Self {
        Self {
            name: name.into(),
            page_number,
            status: PageStatus::NotSubmitted,
            submission_count: 0,
            submitted_size: None,
            submitted_format: None,
            system_check: None,
        }
    }
}

/// One document slot in an applicant's form, holding its numbered pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDoc {
    pub id: DocumentId,
    pub name: String,
    pub format: DocFormat,
    pub ordinal: u32,
    pub status: DocumentStatus,
    pub system_task: Option<SystemTask>,
    pub pages: BTreeMap<u32, FormPage>,
    pub device_submitted: Option<DeviceKind>,
}

/// Denormalized applicant identity embedded in a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormApplicantContext {
    pub id: ApplicantId,
    pub status: ApplicantStatus,
    pub name: Option<PersonName>,
    pub email: String,
}

/// Denormalized company identity embedded in a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormCompanyContext {
    pub id: CompanyId,
    pub name: String,
    pub logo: Option<String>,
}

/// Denormalized dashboard context embedded in a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDashboardContext {
    pub id: DashboardId,
    pub form_content: FormContent,
    pub deadline: DateTime<Utc>,
    pub job: String,
    pub country: String,
    pub messages: DashboardMessages,
}

/// The applicant-facing read/write projection; pages inside `docs` are the
/// applicant's only write surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub created_at: DateTime<Utc>,
    pub applicant: FormApplicantContext,
    pub company: FormCompanyContext,
    pub dashboard: FormDashboardContext,
    pub docs: BTreeMap<String, FormDoc>,
}

/// Applicant-side record of their dashboard membership and progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDashboardState {
    pub id: DashboardId,
    pub status: ApplicantStatus,
    /// Stamped the first time status leaves `Not Submitted`; never cleared.
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Open work-item reference carried on the applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub id: ActionId,
    pub kind: ActionKind,
}

/// Most recent outbound message and its delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestMessage {
    pub id: MessageId,
    pub status: MessageDeliveryStatus,
    pub sent_at: DateTime<Utc>,
}

/// The end user submitting documents against one dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ApplicantId,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub name: Option<PersonName>,
    pub latest_message: Option<LatestMessage>,
    pub actions: Vec<ActionRef>,
    pub dashboard: ApplicantDashboardState,
    pub doc_ids: BTreeMap<String, DocumentId>,
    pub form_id: Option<FormId>,
}

impl Applicant {
    pub fn open_actions(&self) -> usize {
        self.actions.len()
    }
}

/// Page projection inside a review snapshot; carries the human verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCheckPage {
    pub name: String,
    pub page_number: u32,
    pub status: PageStatus,
    pub submission_count: u32,
    pub submitted_size: u64,
    pub submitted_format: String,
    pub system_check: Option<SystemCheckStatus>,
    pub admin_check: Option<AdminCheckStatus>,
}

/// Document projection inside a review snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCheckDoc {
    pub id: DocumentId,
    pub name: String,
    pub format: DocFormat,
    pub ordinal: u32,
    pub status: DocumentStatus,
    pub system_task: Option<SystemTask>,
    pub device_submitted: Option<DeviceKind>,
    pub pages: BTreeMap<u32, AdminCheckPage>,
    pub admin_check_status: AdminCheckStatus,
}

/// Applicant identity shown to reviewers without extra reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCheckApplicantRef {
    pub id: ApplicantId,
    pub name: Option<PersonName>,
    pub email: String,
}

/// Dashboard identity shown to reviewers without extra reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCheckDashboardRef {
    pub id: DashboardId,
    pub job: String,
    pub country: String,
    pub deadline: DateTime<Utc>,
}

/// Human-review snapshot of one applicant's non-accepted documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCheck {
    pub id: AdminCheckId,
    pub created_at: DateTime<Utc>,
    pub company_id: CompanyId,
    pub applicant: AdminCheckApplicantRef,
    pub dashboard: AdminCheckDashboardRef,
    pub form_id: FormId,
    pub docs: BTreeMap<String, AdminCheckDoc>,
    pub admin_check_status: AdminCheckStatus,
}

/// Flattened, queueable projection of one AdminCheckDoc; the unit of work a
/// review queue dispatches to a human worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDoc {
    pub id: WorkerDocId,
    pub created_at: DateTime<Utc>,
    pub company_id: CompanyId,
    pub dashboard_id: DashboardId,
    pub applicant_id: ApplicantId,
    pub admin_check_id: AdminCheckId,
    pub form_id: FormId,
    pub slot: String,
    pub format: DocFormat,
    pub ordinal: u32,
    pub status: DocumentStatus,
    pub device_submitted: Option<DeviceKind>,
    pub pages: BTreeMap<u32, AdminCheckPage>,
}

/// Reviewer identity recorded when an action is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedBy {
    pub id: UserId,
    pub name: PersonName,
}

/// Work-queue entry an admin resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub created_at: DateTime<Utc>,
    pub kind: ActionKind,
    pub company_id: CompanyId,
    pub dashboard_id: DashboardId,
    pub applicant_id: ApplicantId,
    pub applicant_name: Option<PersonName>,
    /// Present for `verifyDocuments` actions; delivery-failure actions carry none.
    pub worker_doc: Option<WorkerDoc>,
    pub is_complete: bool,
    pub completed_by: Option<CompletedBy>,
}

/// Addressing kind for one message recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    To,
    Cc,
    Bcc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub kind: Option<RecipientKind>,
}

/// Engagement data the delivery provider reports with its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageAnalytics {
    pub opens: Option<u32>,
    pub clicks: Option<u32>,
    pub is_spam: Option<bool>,
}

/// Provider response attached to a message by the asynchronous callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponseData {
    pub id: String,
    pub status: MessageDeliveryStatus,
    pub reject_reason: Option<String>,
    pub analytics: Option<MessageAnalytics>,
}

/// Outbound notification sent to an applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
    pub company_id: CompanyId,
    pub dashboard_id: DashboardId,
    pub applicant_id: ApplicantId,
    pub subject: String,
    pub body: String,
    pub from_name: Option<String>,
    pub recipients: Vec<Recipient>,
    pub updated_at: Option<DateTime<Utc>>,
    pub response: Option<MessageResponseData>,
}
