use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use docflow::workflows::intake::domain::{
    ApplicantId, ApplicantStatus, Company, CompanyId, CompletedBy, Dashboard, DashboardId,
    DashboardMessages, DeviceKind, DocFormat, DocumentSpec, DocumentStatus, DraftDashboard,
    FormContent, FormId, PageStatus, PersonName, PublishError, UserId,
};
use docflow::workflows::intake::{
    AdminVerdict, IntakeError, IntakePolicy, IntakeService, IntakeStore, MemoryBlobStore,
    MemoryDeliveryProvider, MemoryInfra, MemoryReviewQueue, MemoryStore, PageError, ReviewError,
    SystemCheckStatus,
};

type MemoryService =
    IntakeService<MemoryStore, MemoryBlobStore, MemoryReviewQueue, MemoryDeliveryProvider>;

struct Harness {
    service: MemoryService,
    infra: MemoryInfra,
    company_id: CompanyId,
    dashboard_id: DashboardId,
}

fn slot_spec(format: DocFormat, page_count: u32, manual: bool) -> DocumentSpec {
    DocumentSpec {
        format,
        sample: None,
        instructions: None,
        ordinal: 1,
        page_count,
        requires_manual_review: manual,
    }
}

fn draft(dashboard_id: &DashboardId, with_opening_message: bool) -> DraftDashboard {
    let created_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        slot_spec(DocFormat::Jpeg, 2, true),
    );
    docs.insert("contract".to_string(), slot_spec(DocFormat::Pdf, 1, false));

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
        messages: with_opening_message.then(|| DashboardMessages {
            opening: "Welcome aboard, please upload your documents.".to_string(),
        }),
    }
}

fn harness_with_draft(with_opening_message: bool) -> Harness {
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
            Dashboard::Draft(draft(&dashboard_id, with_opening_message)),
        )
        .expect("dashboard seeds");

    Harness {
        service,
        infra,
        company_id,
        dashboard_id,
    }
}

fn harness() -> Harness {
    harness_with_draft(true)
}

fn enroll(harness: &Harness) -> (ApplicantId, FormId) {
    harness
        .service
        .publish_dashboard(&harness.company_id, &harness.dashboard_id)
        .expect("dashboard publishes");
    let applicant = harness
        .service
        .add_applicant(
            &harness.company_id,
            &harness.dashboard_id,
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

fn submit(harness: &Harness, form_id: &FormId, slot: &str, page_number: u32, expected: u32) {
    let (bytes, content_type): (&[u8], &str) = match slot {
        "contract" => (b"%PDF-1.7 payload", "application/pdf"),
        _ => (b"jpeg payload", "image/jpeg"),
    };
    harness
        .service
        .submit_page(
            form_id,
            slot,
            page_number,
            expected,
            bytes,
            content_type,
            DeviceKind::Mobile,
        )
        .expect("page submission lands");
}

fn reviewer() -> CompletedBy {
    CompletedBy {
        id: UserId("user-ops".to_string()),
        name: PersonName {
            first: "Alex".to_string(),
            last: "Reviewer".to_string(),
        },
    }
}

#[test]
fn accepted_review_walks_an_applicant_to_complete() {
    let harness = harness();
    let (applicant_id, form_id) = enroll(&harness);

    submit(&harness, &form_id, "passport", 1, 0);
    submit(&harness, &form_id, "contract", 1, 0);
    // The second passport page completes the manual slot and opens a check
    // covering every document that is not yet accepted.
    submit(&harness, &form_id, "passport", 2, 0);
    harness
        .service
        .apply_system_check(&form_id, "passport", 1, SystemCheckStatus::Accepted)
        .expect("system check lands");

    let check = harness
        .service
        .open_admin_check(&form_id)
        .expect("the open check is reused");
    assert_eq!(check.docs.len(), 2);

    let mut check = check;
    for (slot, doc) in check.docs.clone() {
        for page_number in doc.pages.keys() {
            check = harness
                .service
                .resolve_admin_page(
                    &check.id,
                    &slot,
                    *page_number,
                    AdminVerdict::Accepted,
                    reviewer(),
                )
                .expect("verdict lands");
        }
    }
    assert!(check.admin_check_status.is_terminal());

    let form = harness
        .infra
        .store
        .get_form(&form_id)
        .expect("store read")
        .expect("form stored")
        .entity;
    assert!(form
        .docs
        .values()
        .all(|doc| doc.status == DocumentStatus::Accepted));
    assert_eq!(form.applicant.status, ApplicantStatus::Complete);

    let applicant = harness
        .infra
        .store
        .get_applicant(&harness.company_id, &harness.dashboard_id, &applicant_id)
        .expect("store read")
        .expect("applicant stored")
        .entity;
    assert!(applicant.actions.is_empty());
    assert!(applicant.dashboard.submitted_at.is_some());

    let counters = harness
        .service
        .dashboard_counters(&harness.company_id, &harness.dashboard_id)
        .expect("counters read");
    assert_eq!(counters.applicants, 1);
    assert_eq!(counters.complete_applicants, 1);
    assert_eq!(counters.incomplete_applicants, 0);
    assert_eq!(counters.actions, 0);
}

#[test]
fn overturned_acceptance_reopens_the_live_page() {
    let harness = harness();
    let (_, form_id) = enroll(&harness);

    submit(&harness, &form_id, "passport", 1, 0);
    submit(&harness, &form_id, "contract", 1, 0);
    submit(&harness, &form_id, "passport", 2, 0);

    let check = harness
        .service
        .open_admin_check(&form_id)
        .expect("the open check is reused");
    for page_number in [1, 2] {
        harness
            .service
            .resolve_admin_page(
                &check.id,
                "passport",
                page_number,
                AdminVerdict::Accepted,
                reviewer(),
            )
            .expect("acceptance lands");
    }

    let form = harness
        .infra
        .store
        .get_form(&form_id)
        .expect("store read")
        .expect("form stored")
        .entity;
    assert_eq!(
        form.docs["passport"].status,
        DocumentStatus::Accepted,
        "doc-level write-back accepts the live pages"
    );

    // The reviewer reconsiders page two while the check is still open.
    harness
        .service
        .resolve_admin_page(&check.id, "passport", 2, AdminVerdict::Rejected, reviewer())
        .expect("overturn lands");

    let form = harness
        .infra
        .store
        .get_form(&form_id)
        .expect("store read")
        .expect("form stored")
        .entity;
    let passport = &form.docs["passport"];
    assert_eq!(passport.pages[&2].status, PageStatus::Submitted);
    assert_eq!(passport.pages[&1].status, PageStatus::Accepted);
    assert_eq!(passport.status, DocumentStatus::Submitted);
}

#[test]
fn concurrent_submissions_are_refused_as_stale() {
    let harness = harness();
    let (_, form_id) = enroll(&harness);

    submit(&harness, &form_id, "passport", 1, 0);

    // A second client still holding count 0 races the first.
    let result = harness.service.submit_page(
        &form_id,
        "passport",
        1,
        0,
        b"jpeg payload",
        "image/jpeg",
        DeviceKind::Mobile,
    );

    assert!(matches!(
        result,
        Err(IntakeError::Page(PageError::StaleSubmission {
            expected: 0,
            found: 1
        }))
    ));
}

#[test]
fn review_refuses_verdicts_on_resubmitted_pages() {
    let harness = harness();
    let (_, form_id) = enroll(&harness);

    submit(&harness, &form_id, "passport", 1, 0);
    submit(&harness, &form_id, "passport", 2, 0);
    let check = harness
        .service
        .open_admin_check(&form_id)
        .expect("the open check is reused");

    harness
        .service
        .reject_page(&form_id, "passport", 1)
        .expect("rejection lands");
    submit(&harness, &form_id, "passport", 1, 1);

    let result = harness.service.resolve_admin_page(
        &check.id,
        "passport",
        1,
        AdminVerdict::Accepted,
        reviewer(),
    );

    assert!(matches!(
        result,
        Err(IntakeError::Review(ReviewError::StaleReview {
            snapshot: 1,
            live: 2
        }))
    ));
}

#[test]
fn publishing_requires_the_opening_message() {
    let harness = harness_with_draft(false);

    let result = harness
        .service
        .publish_dashboard(&harness.company_id, &harness.dashboard_id);
    assert!(matches!(
        result,
        Err(IntakeError::Publish(PublishError::IncompleteSpec {
            missing: "messages.opening"
        }))
    ));

    // Fill in the missing message and publish for real.
    let stored = harness
        .infra
        .store
        .get_dashboard(&harness.company_id, &harness.dashboard_id)
        .expect("store read")
        .expect("dashboard stored");
    let mut dashboard = stored.entity;
    if let Dashboard::Draft(ref mut draft) = dashboard {
        draft.messages = Some(DashboardMessages {
            opening: "Welcome aboard.".to_string(),
        });
    }
    harness
        .infra
        .store
        .put_dashboard(
            &harness.company_id,
            docflow::workflows::intake::Versioned {
                version: stored.version,
                entity: dashboard,
            },
        )
        .expect("draft updates");

    let published = harness
        .service
        .publish_dashboard(&harness.company_id, &harness.dashboard_id)
        .expect("dashboard publishes");
    assert_eq!(published.counters.applicants, 0);
    assert_eq!(published.counters.actions, 0);
    assert_eq!(published.counters.messages_sent, 0);
}

#[test]
fn reconcile_rebuilds_counters_after_drift() {
    let harness = harness();
    let (_, form_id) = enroll(&harness);
    submit(&harness, &form_id, "passport", 1, 0);

    // Corrupt the cached counters behind the engine's back.
    let stored = harness
        .infra
        .store
        .get_dashboard(&harness.company_id, &harness.dashboard_id)
        .expect("store read")
        .expect("dashboard stored");
    let mut dashboard = stored.entity;
    if let Dashboard::Published(ref mut published) = dashboard {
        published.counters.applicants = 40;
        published.counters.incomplete_applicants = 9;
    }
    harness
        .infra
        .store
        .put_dashboard(
            &harness.company_id,
            docflow::workflows::intake::Versioned {
                version: stored.version,
                entity: dashboard,
            },
        )
        .expect("corruption writes");

    let counters = harness
        .service
        .reconcile_dashboard(&harness.company_id, &harness.dashboard_id)
        .expect("reconcile runs");

    assert_eq!(counters.applicants, 1);
    assert_eq!(counters.incomplete_applicants, 1);
    assert_eq!(counters.complete_applicants, 0);
    assert_eq!(counters.actions, 0);
}
