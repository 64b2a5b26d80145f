use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};

use super::common::*;
use crate::workflows::intake::domain::{
    AdminCheck, AdminCheckId, AdminCheckStatus, ApplicantId, ApplicantStatus, CompanyId,
    DashboardId, DashboardMessages, DocFormat, Form, FormApplicantContext, FormCompanyContext,
    FormContent, FormDashboardContext, FormDoc, FormId, PageStatus, SystemCheckStatus,
    WorkerDocId,
};
use crate::workflows::intake::review::{self, AdminVerdict, ReviewError};

fn form_with(docs: BTreeMap<String, FormDoc>) -> Form {
    let created_at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
    Form {
        id: FormId("form-1".to_string()),
        created_at,
        applicant: FormApplicantContext {
            id: ApplicantId("applicant-1".to_string()),
            status: ApplicantStatus::Incomplete,
            name: None,
            email: "sam@example.com".to_string(),
        },
        company: FormCompanyContext {
            id: CompanyId("acme".to_string()),
            name: "Acme Logistics".to_string(),
            logo: None,
        },
        dashboard: FormDashboardContext {
            id: DashboardId("warehouse".to_string()),
            form_content: FormContent {
                header: "Upload your documents".to_string(),
                caption: "Passport and contract.".to_string(),
            },
            deadline: created_at + Duration::days(30),
            job: "Warehouse Operative".to_string(),
            country: "NL".to_string(),
            messages: DashboardMessages {
                opening: "Welcome.".to_string(),
            },
        },
        docs,
    }
}

fn check_for(form: &Form) -> AdminCheck {
    review::build_admin_check(
        AdminCheckId("check-1".to_string()),
        form,
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap(),
    )
    .expect("form has reviewable documents")
}

#[test]
fn needs_admin_check_waits_for_a_full_submission() {
    let spec = document_spec(DocFormat::Jpeg, 2, true);
    let partial = doc_with_pages(vec![page_in(PageStatus::Submitted, 1, 1)]);
    assert!(!review::needs_admin_check(&partial, &spec));

    let full = doc_with_pages(vec![
        page_in(PageStatus::Submitted, 1, 1),
        page_in(PageStatus::Submitted, 1, 2),
    ]);
    assert!(review::needs_admin_check(&full, &spec));
}

#[test]
fn clean_system_checks_skip_review_unless_the_slot_demands_it() {
    let automated = document_spec(DocFormat::Jpeg, 2, false);
    let manual = document_spec(DocFormat::Jpeg, 2, true);

    let clean = doc_with_pages(vec![
        checked(page_in(PageStatus::Submitted, 1, 1), SystemCheckStatus::Accepted),
        checked(page_in(PageStatus::Submitted, 1, 2), SystemCheckStatus::Accepted),
    ]);
    assert!(!review::needs_admin_check(&clean, &automated));
    assert!(review::needs_admin_check(&clean, &manual));

    // A missing or failed automated verdict always routes to a human.
    let unchecked = doc_with_pages(vec![
        checked(page_in(PageStatus::Submitted, 1, 1), SystemCheckStatus::Accepted),
        page_in(PageStatus::Submitted, 1, 2),
    ]);
    assert!(review::needs_admin_check(&unchecked, &automated));

    let failed = doc_with_pages(vec![
        checked(page_in(PageStatus::Submitted, 1, 1), SystemCheckStatus::Rejected),
        checked(page_in(PageStatus::Submitted, 1, 2), SystemCheckStatus::Accepted),
    ]);
    assert!(review::needs_admin_check(&failed, &automated));
}

#[test]
fn projection_skips_unsubmitted_pages_and_accepted_documents() {
    let mut accepted = doc_with_pages(vec![
        page_in(PageStatus::Accepted, 1, 1),
        page_in(PageStatus::Accepted, 1, 2),
    ]);
    accepted.status = crate::workflows::intake::domain::DocumentStatus::Accepted;
    assert!(review::project_doc(&accepted).is_none());

    let mixed = doc_with_pages(vec![
        page_in(PageStatus::Submitted, 1, 1),
        page_in(PageStatus::NotSubmitted, 0, 2),
    ]);
    let projected = review::project_doc(&mixed).expect("submitted pages project");
    assert_eq!(projected.pages.len(), 1);
    assert!(projected.pages.contains_key(&1));
    assert_eq!(projected.admin_check_status, AdminCheckStatus::NotChecked);
}

#[test]
fn build_admin_check_returns_none_when_nothing_is_reviewable() {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        doc_with_pages(vec![page_in(PageStatus::NotSubmitted, 0, 1)]),
    );
    let form = form_with(docs);

    assert!(review::build_admin_check(
        AdminCheckId("check-1".to_string()),
        &form,
        Utc::now()
    )
    .is_none());
}

#[test]
fn worker_doc_carries_the_addressing_needed_to_dispatch() {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        doc_with_pages(vec![page_in(PageStatus::Submitted, 1, 1)]),
    );
    let form = form_with(docs);
    let check = check_for(&form);

    let doc = check.docs.get("passport").expect("projected");
    let worker = review::project_worker_doc(
        WorkerDocId("worker-1".to_string()),
        &check,
        "passport",
        doc,
        Utc::now(),
    );

    assert_eq!(worker.admin_check_id, check.id);
    assert_eq!(worker.form_id, form.id);
    assert_eq!(worker.slot, "passport");
    assert_eq!(worker.pages.len(), 1);
}

#[test]
fn verdicts_roll_up_from_pages_to_documents_to_the_check() {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        doc_with_pages(vec![
            page_in(PageStatus::Submitted, 1, 1),
            page_in(PageStatus::Submitted, 1, 2),
        ]),
    );
    let form = form_with(docs);
    let mut check = check_for(&form);

    let first = review::resolve_page(&mut check, "passport", 1, AdminVerdict::Accepted, 1)
        .expect("first verdict lands");
    assert_eq!(first.doc_status, AdminCheckStatus::NotChecked);
    assert_eq!(check.admin_check_status, AdminCheckStatus::NotChecked);

    let second = review::resolve_page(&mut check, "passport", 2, AdminVerdict::Accepted, 1)
        .expect("second verdict lands");
    assert_eq!(second.doc_status, AdminCheckStatus::Accepted);
    assert_eq!(check.admin_check_status, AdminCheckStatus::Accepted);
}

#[test]
fn one_rejection_rejects_document_and_check() {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        doc_with_pages(vec![
            page_in(PageStatus::Submitted, 1, 1),
            page_in(PageStatus::Submitted, 1, 2),
        ]),
    );
    let form = form_with(docs);
    let mut check = check_for(&form);

    let outcome = review::resolve_page(&mut check, "passport", 2, AdminVerdict::Rejected, 1)
        .expect("rejection lands");

    assert_eq!(outcome.doc_status, AdminCheckStatus::Rejected);
    assert_eq!(check.admin_check_status, AdminCheckStatus::Rejected);
}

#[test]
fn a_resubmission_since_the_snapshot_is_a_stale_review() {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        doc_with_pages(vec![page_in(PageStatus::Submitted, 1, 1)]),
    );
    let form = form_with(docs);
    let mut check = check_for(&form);

    // The applicant resubmitted: live count is now 2, snapshot holds 1.
    let result = review::resolve_page(&mut check, "passport", 1, AdminVerdict::Accepted, 2);

    assert_eq!(
        result,
        Err(ReviewError::StaleReview {
            snapshot: 1,
            live: 2
        })
    );
    assert_eq!(check.admin_check_status, AdminCheckStatus::NotChecked);
}

#[test]
fn terminal_checks_refuse_further_verdicts() {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        doc_with_pages(vec![page_in(PageStatus::Submitted, 1, 1)]),
    );
    let form = form_with(docs);
    let mut check = check_for(&form);

    review::resolve_page(&mut check, "passport", 1, AdminVerdict::Accepted, 1)
        .expect("verdict lands");
    assert!(check.admin_check_status.is_terminal());

    let result = review::resolve_page(&mut check, "passport", 1, AdminVerdict::Rejected, 1);
    assert!(matches!(result, Err(ReviewError::InvalidTransition { .. })));
}

#[test]
fn unknown_slots_and_pages_are_reported() {
    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        doc_with_pages(vec![page_in(PageStatus::Submitted, 1, 1)]),
    );
    let form = form_with(docs);
    let mut check = check_for(&form);

    assert!(matches!(
        review::resolve_page(&mut check, "visa", 1, AdminVerdict::Accepted, 1),
        Err(ReviewError::UnknownSlot { .. })
    ));
    assert!(matches!(
        review::resolve_page(&mut check, "passport", 9, AdminVerdict::Accepted, 1),
        Err(ReviewError::UnknownPage { .. })
    ));
}
