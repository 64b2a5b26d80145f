//! Document aggregator.
//!
//! A document's status is a pure function of its pages and the slot's
//! expected page count. Nothing else writes `FormDoc::status`; callers mutate
//! pages through the page state machine and then recompute here, in the same
//! logical transaction.

use super::domain::{DocumentSpec, DocumentStatus, FormDoc, PageStatus, SystemTask};

/// Status change produced by a recompute, consumed by the applicant aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTransition {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

/// Derive a document's status from its pages.
pub fn document_status(doc: &FormDoc, spec: &DocumentSpec) -> DocumentStatus {
    let any_submitted = doc
        .pages
        .values()
        .any(|page| page.status != PageStatus::NotSubmitted);
    if !any_submitted {
        return DocumentStatus::NotSubmitted;
    }

    if doc
        .pages
        .values()
        .any(|page| page.status == PageStatus::Rejected)
    {
        return DocumentStatus::Rejected;
    }

    let all_expected_accepted = (1..=spec.page_count).all(|number| {
        doc.pages
            .get(&number)
            .map(|page| page.status == PageStatus::Accepted)
            .unwrap_or(false)
    });
    if all_expected_accepted {
        DocumentStatus::Accepted
    } else {
        DocumentStatus::Submitted
    }
}

/// Page numbers the applicant must resubmit.
pub fn rejected_page_numbers(doc: &FormDoc) -> Vec<u32> {
    doc.pages
        .values()
        .filter(|page| page.status == PageStatus::Rejected)
        .map(|page| page.page_number)
        .collect()
}

/// Derive the system task the applicant is expected to perform next.
///
/// `createDoc` before any page exists, `resubmitDoc` when every expected page
/// was rejected, `resubmitPages` when only specific pages were, and none once
/// the document is accepted or merely awaiting verdicts.
pub fn system_task_for(doc: &FormDoc, spec: &DocumentSpec) -> Option<SystemTask> {
    match document_status(doc, spec) {
        DocumentStatus::NotSubmitted => Some(SystemTask::CreateDoc),
        DocumentStatus::Rejected => {
            let whole_doc_rejected = (1..=spec.page_count).all(|number| {
                doc.pages
                    .get(&number)
                    .map(|page| page.status == PageStatus::Rejected)
                    .unwrap_or(false)
            });
            if whole_doc_rejected {
                Some(SystemTask::ResubmitDoc)
            } else {
                Some(SystemTask::ResubmitPages)
            }
        }
        DocumentStatus::Submitted | DocumentStatus::Accepted => None,
    }
}

/// Recompute and persist the document's derived fields.
///
/// Returns the status transition when the stored status changed, so the
/// caller can drive applicant aggregation without a second comparison.
pub fn recompute(doc: &mut FormDoc, spec: &DocumentSpec) -> Option<DocumentTransition> {
    let from = doc.status;
    let to = document_status(doc, spec);
    doc.status = to;
    doc.system_task = system_task_for(doc, spec);

    (from != to).then_some(DocumentTransition { from, to })
}
