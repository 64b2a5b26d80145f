//! Applicant status aggregator.
//!
//! An applicant's status is a pure function of their document statuses and
//! their count of open actions. Recomputation is idempotent; the first move
//! away from `Not Submitted` stamps `submitted_at` once.

use chrono::{DateTime, Utc};

use super::domain::{Applicant, ApplicantStatus, DocumentStatus};

/// Status change produced by a recompute, consumed by the counter engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicantTransition {
    pub from: ApplicantStatus,
    pub to: ApplicantStatus,
}

/// Derive an applicant's status from document statuses and open actions.
pub fn applicant_status<I>(doc_statuses: I, open_actions: usize) -> ApplicantStatus
where
    I: IntoIterator<Item = DocumentStatus>,
{
    let mut any = false;
    let mut all_not_submitted = true;
    let mut all_accepted = true;
    for status in doc_statuses {
        any = true;
        if status != DocumentStatus::NotSubmitted {
            all_not_submitted = false;
        }
        if status != DocumentStatus::Accepted {
            all_accepted = false;
        }
    }

    if !any || all_not_submitted {
        ApplicantStatus::NotSubmitted
    } else if all_accepted && open_actions == 0 {
        ApplicantStatus::Complete
    } else {
        ApplicantStatus::Incomplete
    }
}

/// Recompute and persist the applicant's dashboard status.
///
/// Returns the transition when the stored status changed so the caller can
/// emit exactly one counter delta for it.
pub fn recompute<I>(
    applicant: &mut Applicant,
    doc_statuses: I,
    now: DateTime<Utc>,
) -> Option<ApplicantTransition>
where
    I: IntoIterator<Item = DocumentStatus>,
{
    let from = applicant.dashboard.status;
    let to = applicant_status(doc_statuses, applicant.open_actions());

    if from == ApplicantStatus::NotSubmitted
        && to != ApplicantStatus::NotSubmitted
        && applicant.dashboard.submitted_at.is_none()
    {
        applicant.dashboard.submitted_at = Some(now);
    }

    applicant.dashboard.status = to;
    (from != to).then_some(ApplicantTransition { from, to })
}
