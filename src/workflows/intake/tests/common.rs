use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};

use crate::workflows::intake::domain::{
    ApplicantId, Company, CompanyId, CompletedBy, Dashboard, DashboardId, DashboardMessages,
    DeviceKind, DocFormat, DocumentId, DocumentSpec, DocumentStatus, DraftDashboard, FormContent,
    FormDoc, FormId, FormPage, PageStatus, PersonName, SystemCheckStatus, UserId,
};
use crate::workflows::intake::repository::{
    IntakeStore, MemoryBlobStore, MemoryDeliveryProvider, MemoryInfra, MemoryReviewQueue,
    MemoryStore,
};
use crate::workflows::intake::service::{IntakePolicy, IntakeService};

pub(super) type MemoryService =
    IntakeService<MemoryStore, MemoryBlobStore, MemoryReviewQueue, MemoryDeliveryProvider>;

pub(super) struct Fixture {
    pub(super) service: MemoryService,
    pub(super) infra: MemoryInfra,
    pub(super) company_id: CompanyId,
    pub(super) dashboard_id: DashboardId,
}

pub(super) fn document_spec(format: DocFormat, page_count: u32, manual: bool) -> DocumentSpec {
    DocumentSpec {
        format,
        sample: None,
        instructions: None,
        ordinal: 1,
        page_count,
        requires_manual_review: manual,
    }
}

/// Passport slot (two jpeg pages, always human-reviewed) plus a contract slot
/// (single pdf page, automated checks only).
pub(super) fn standard_docs() -> BTreeMap<String, DocumentSpec> {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        document_spec(DocFormat::Jpeg, 2, true),
    );
    docs.insert(
        "contract".to_string(),
        document_spec(DocFormat::Pdf, 1, false),
    );
    docs
}

pub(super) fn draft_dashboard(
    dashboard_id: &DashboardId,
    docs: BTreeMap<String, DocumentSpec>,
) -> DraftDashboard {
    let created_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    DraftDashboard {
        id: dashboard_id.clone(),
        created_at,
        created_by: UserId("user-ops".to_string()),
        country: "NL".to_string(),
        job: "Warehouse Operative".to_string(),
        title: "Warehouse intake".to_string(),
        deadline: created_at + Duration::days(30),
        form_content: Some(FormContent {
            header: "Upload your documents".to_string(),
            caption: "Passport and signed contract.".to_string(),
        }),
        docs,
        applicants: Vec::new(),
        messages: Some(DashboardMessages {
            opening: "Welcome aboard, please upload your documents.".to_string(),
        }),
    }
}

/// Service over fresh memory infrastructure with a seeded company and a draft
/// dashboard carrying the standard two slots.
pub(super) fn fixture() -> Fixture {
    fixture_with_docs(standard_docs())
}

pub(super) fn fixture_with_docs(docs: BTreeMap<String, DocumentSpec>) -> Fixture {
    let infra = MemoryInfra::default();
    let service = IntakeService::new(
        infra.store.clone(),
        infra.blobs.clone(),
        infra.queue.clone(),
        infra.delivery.clone(),
        IntakePolicy::default(),
    );

    let company_id = CompanyId("acme".to_string());
    let dashboard_id = DashboardId("warehouse".to_string());
    infra
        .store
        .insert_company(Company {
            id: company_id.clone(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            name: "Acme Logistics".to_string(),
            users: vec![UserId("user-ops".to_string())],
            logo: None,
        })
        .expect("company seeds");
    infra
        .store
        .insert_dashboard(
            &company_id,
            Dashboard::Draft(draft_dashboard(&dashboard_id, docs)),
        )
        .expect("dashboard seeds");

    Fixture {
        service,
        infra,
        company_id,
        dashboard_id,
    }
}

/// Publish the seeded dashboard and enroll one applicant.
pub(super) fn enroll(fx: &Fixture) -> (ApplicantId, FormId) {
    fx.service
        .publish_dashboard(&fx.company_id, &fx.dashboard_id)
        .expect("dashboard publishes");
    let applicant = fx
        .service
        .add_applicant(
            &fx.company_id,
            &fx.dashboard_id,
            "sam@example.com",
            Some(PersonName {
                first: "Sam".to_string(),
                last: "Driver".to_string(),
            }),
        )
        .expect("applicant enrolls");
    let form_id = applicant.form_id.clone().expect("enrollment creates a form");
    (applicant.id, form_id)
}

pub(super) fn reviewer() -> CompletedBy {
    CompletedBy {
        id: UserId("user-ops".to_string()),
        name: PersonName {
            first: "Alex".to_string(),
            last: "Reviewer".to_string(),
        },
    }
}

/// Submit one page through the service with sensible defaults for the slot.
pub(super) fn submit(
    fx: &Fixture,
    form_id: &FormId,
    slot: &str,
    page_number: u32,
    expected_count: u32,
) -> Result<crate::workflows::intake::domain::Form, crate::workflows::intake::service::IntakeError>
{
    let (bytes, content_type): (&[u8], &str) = match slot {
        "contract" => (b"%PDF-1.7 payload", "application/pdf"),
        _ => (b"jpeg payload", "image/jpeg"),
    };
    fx.service.submit_page(
        form_id,
        slot,
        page_number,
        expected_count,
        bytes,
        content_type,
        DeviceKind::Mobile,
    )
}

// ---------------------------------------------------------------------------
// Pure-model builders for the state machine and aggregator tests.
// ---------------------------------------------------------------------------

pub(super) fn page_in(status: PageStatus, submission_count: u32, page_number: u32) -> FormPage {
    FormPage {
        name: "passport".to_string(),
        page_number,
        status,
        submission_count,
        submitted_size: (submission_count > 0).then_some(2_048),
        submitted_format: (submission_count > 0).then(|| "image/jpeg".to_string()),
        system_check: None,
    }
}

pub(super) fn doc_with_pages(pages: Vec<FormPage>) -> FormDoc {
    FormDoc {
        id: DocumentId("doc-1".to_string()),
        name: "passport".to_string(),
        format: DocFormat::Jpeg,
        ordinal: 1,
        status: DocumentStatus::NotSubmitted,
        system_task: None,
        pages: pages
            .into_iter()
            .map(|page| (page.page_number, page))
            .collect(),
        device_submitted: Some(DeviceKind::Mobile),
    }
}

pub(super) fn checked(mut page: FormPage, verdict: SystemCheckStatus) -> FormPage {
    page.system_check = Some(verdict);
    page
}
