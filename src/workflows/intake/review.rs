//! Admin check workflow.
//!
//! A review snapshot projects an applicant's non-accepted documents into
//! `AdminCheckDoc`/`AdminCheckPage` records a human can verdict page by page.
//! Projections are explicit field-by-field functions rather than structural
//! reuse of the live form types, so review state never leaks back into the
//! submission surface except through the deliberate write-back path in the
//! service layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AdminCheck, AdminCheckApplicantRef, AdminCheckDashboardRef, AdminCheckDoc, AdminCheckId,
    AdminCheckPage, AdminCheckStatus, DocumentSpec, DocumentStatus, Form, FormDoc, FormPage,
    SystemCheckStatus, WorkerDoc, WorkerDocId,
};

/// Errors raised while resolving review verdicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    /// The live page advanced past the snapshot; the admin must re-pull.
    #[error("stale review: snapshot holds submission {snapshot}, live page is at {live}")]
    StaleReview { snapshot: u32, live: u32 },
    /// The check record itself was updated concurrently; re-pull before retrying.
    #[error("stale review: the check was updated concurrently")]
    StaleSnapshot,
    #[error("invalid transition: cannot {action} an admin check in status {status:?}")]
    InvalidTransition {
        status: AdminCheckStatus,
        action: &'static str,
    },
    #[error("admin check has no document slot named {slot}")]
    UnknownSlot { slot: String },
    #[error("document slot {slot} has no page {page_number} in this check")]
    UnknownPage { slot: String, page_number: u32 },
}

/// A human verdict on one snapshot page. `Not Checked` is not a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminVerdict {
    Accepted,
    Rejected,
}

impl AdminVerdict {
    pub const fn status(self) -> AdminCheckStatus {
        match self {
            AdminVerdict::Accepted => AdminCheckStatus::Accepted,
            AdminVerdict::Rejected => AdminCheckStatus::Rejected,
        }
    }
}

/// Whether a document needs the human admin-check step once fully submitted.
///
/// Policy floor: any page with a missing or rejected automated check, or a
/// slot whose spec always routes through manual review.
pub fn needs_admin_check(doc: &FormDoc, spec: &DocumentSpec) -> bool {
    let fully_submitted = spec.page_count > 0
        && (1..=spec.page_count).all(|number| {
            doc.pages
                .get(&number)
                .map(|page| page.submission_count > 0)
                .unwrap_or(false)
        });
    if !fully_submitted {
        return false;
    }

    spec.requires_manual_review
        || doc.pages.values().any(|page| {
            page.submission_count > 0
                && !matches!(page.system_check, Some(SystemCheckStatus::Accepted))
        })
}

/// Project one live page into its review snapshot.
///
/// Pages with no submission yet have nothing to review and are skipped.
pub fn project_page(page: &FormPage) -> Option<AdminCheckPage> {
    if page.submission_count == 0 {
        return None;
    }
    Some(AdminCheckPage {
        name: page.name.clone(),
        page_number: page.page_number,
        status: page.status,
        submission_count: page.submission_count,
        submitted_size: page.submitted_size.unwrap_or(0),
        submitted_format: page.submitted_format.clone().unwrap_or_default(),
        system_check: page.system_check,
        admin_check: None,
    })
}

/// Project one live document into its review snapshot.
///
/// Accepted documents need no review; documents with no submitted pages have
/// nothing to show a reviewer. Both yield `None`.
pub fn project_doc(doc: &FormDoc) -> Option<AdminCheckDoc> {
    if doc.status == DocumentStatus::Accepted {
        return None;
    }
    let pages: std::collections::BTreeMap<u32, AdminCheckPage> = doc
        .pages
        .values()
        .filter_map(project_page)
        .map(|page| (page.page_number, page))
        .collect();
    if pages.is_empty() {
        return None;
    }

    Some(AdminCheckDoc {
        id: doc.id.clone(),
        name: doc.name.clone(),
        format: doc.format,
        ordinal: doc.ordinal,
        status: doc.status,
        system_task: doc.system_task,
        device_submitted: doc.device_submitted,
        pages,
        admin_check_status: AdminCheckStatus::NotChecked,
    })
}

/// Build a review snapshot for every reviewable document on the form.
///
/// Returns `None` when nothing on the form is reviewable yet.
pub fn build_admin_check(
    id: AdminCheckId,
    form: &Form,
    now: DateTime<Utc>,
) -> Option<AdminCheck> {
    let docs: std::collections::BTreeMap<String, AdminCheckDoc> = form
        .docs
        .iter()
        .filter_map(|(slot, doc)| project_doc(doc).map(|projected| (slot.clone(), projected)))
        .collect();
    if docs.is_empty() {
        return None;
    }

    Some(AdminCheck {
        id,
        created_at: now,
        company_id: form.company.id.clone(),
        applicant: AdminCheckApplicantRef {
            id: form.applicant.id.clone(),
            name: form.applicant.name.clone(),
            email: form.applicant.email.clone(),
        },
        dashboard: AdminCheckDashboardRef {
            id: form.dashboard.id.clone(),
            job: form.dashboard.job.clone(),
            country: form.dashboard.country.clone(),
            deadline: form.dashboard.deadline,
        },
        form_id: form.id.clone(),
        docs,
        admin_check_status: AdminCheckStatus::NotChecked,
    })
}

/// Bring an open snapshot back in line with the live form.
///
/// Documents and pages submitted after the snapshot was taken are projected
/// in, and documents the live form has since accepted drop out. A verdict
/// already recorded survives only while the page's submission count still
/// matches what the reviewer saw. Returns whether the snapshot changed.
pub fn refresh_admin_check(check: &mut AdminCheck, form: &Form) -> bool {
    let mut docs: std::collections::BTreeMap<String, AdminCheckDoc> = form
        .docs
        .iter()
        .filter_map(|(slot, doc)| project_doc(doc).map(|projected| (slot.clone(), projected)))
        .collect();
    for (slot, doc) in &mut docs {
        if let Some(previous) = check.docs.get(slot) {
            for (number, page) in &mut doc.pages {
                if let Some(seen) = previous.pages.get(number) {
                    if seen.submission_count == page.submission_count {
                        page.admin_check = seen.admin_check;
                    }
                }
            }
            doc.admin_check_status = doc_check_status(doc);
        }
    }
    if docs == check.docs {
        return false;
    }

    check.docs = docs;
    check.admin_check_status = check_status(check);
    true
}

/// Flatten one snapshot document into the queueable worker unit.
pub fn project_worker_doc(
    id: WorkerDocId,
    check: &AdminCheck,
    slot: &str,
    doc: &AdminCheckDoc,
    now: DateTime<Utc>,
) -> WorkerDoc {
    WorkerDoc {
        id,
        created_at: now,
        company_id: check.company_id.clone(),
        dashboard_id: check.dashboard.id.clone(),
        applicant_id: check.applicant.id.clone(),
        admin_check_id: check.id.clone(),
        form_id: check.form_id.clone(),
        slot: slot.to_string(),
        format: doc.format,
        ordinal: doc.ordinal,
        status: doc.status,
        device_submitted: doc.device_submitted,
        pages: doc.pages.clone(),
    }
}

/// Overall verdict for one snapshot document.
pub fn doc_check_status(doc: &AdminCheckDoc) -> AdminCheckStatus {
    page_set_status(doc.pages.values().map(|page| page.admin_check))
}

/// Overall verdict for the whole check: accepted only when every page of
/// every document is accepted; rejected as soon as any page is.
pub fn check_status(check: &AdminCheck) -> AdminCheckStatus {
    page_set_status(
        check
            .docs
            .values()
            .flat_map(|doc| doc.pages.values().map(|page| page.admin_check)),
    )
}

fn page_set_status<I>(verdicts: I) -> AdminCheckStatus
where
    I: IntoIterator<Item = Option<AdminCheckStatus>>,
{
    let mut all_accepted = true;
    let mut any = false;
    for verdict in verdicts {
        any = true;
        match verdict {
            Some(AdminCheckStatus::Rejected) => return AdminCheckStatus::Rejected,
            Some(AdminCheckStatus::Accepted) => {}
            _ => all_accepted = false,
        }
    }
    if any && all_accepted {
        AdminCheckStatus::Accepted
    } else {
        AdminCheckStatus::NotChecked
    }
}

/// Effect of one verdict, consumed by the service write-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub verdict: AdminVerdict,
    /// Recomputed status of the document the verdict landed on.
    pub doc_status: AdminCheckStatus,
    /// Recomputed overall status of the check.
    pub check_status: AdminCheckStatus,
}

/// Record an admin verdict on one snapshot page.
///
/// Verdicts are refused when the parent check is already terminal, and when
/// the live page's submission count advanced past the snapshot
/// (`StaleReview`): the admin must re-pull a fresh snapshot rather than
/// overwrite a newer applicant submission.
pub fn resolve_page(
    check: &mut AdminCheck,
    slot: &str,
    page_number: u32,
    verdict: AdminVerdict,
    live_submission_count: u32,
) -> Result<ResolveOutcome, ReviewError> {
    if check.admin_check_status.is_terminal() {
        return Err(ReviewError::InvalidTransition {
            status: check.admin_check_status,
            action: "resolve a page of",
        });
    }

    let doc = check
        .docs
        .get_mut(slot)
        .ok_or_else(|| ReviewError::UnknownSlot {
            slot: slot.to_string(),
        })?;
    let page = doc
        .pages
        .get_mut(&page_number)
        .ok_or_else(|| ReviewError::UnknownPage {
            slot: slot.to_string(),
            page_number,
        })?;

    if page.submission_count != live_submission_count {
        return Err(ReviewError::StaleReview {
            snapshot: page.submission_count,
            live: live_submission_count,
        });
    }

    page.admin_check = Some(verdict.status());
    doc.admin_check_status = doc_check_status(doc);
    let doc_status = doc.admin_check_status;
    check.admin_check_status = check_status(check);

    Ok(ResolveOutcome {
        verdict,
        doc_status,
        check_status: check.admin_check_status,
    })
}
