//! Page state machine.
//!
//! `Not Submitted -> Submitted -> {Accepted, Rejected}` with the single
//! back-edge `Rejected -> Submitted` (resubmission). `Accepted` is terminal
//! for the submission count that earned it; reopening an accepted page takes
//! an explicit admin rejection, never an implicit resubmit.

use super::domain::{FormPage, PageStatus, SystemCheckStatus};

/// Errors raised by page transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    /// The caller acted on a submission count that is no longer current.
    #[error("stale submission: expected count {expected}, page is at {found}")]
    StaleSubmission { expected: u32, found: u32 },
    /// A concurrent writer updated the form mid-operation; re-read and retry.
    #[error("the form was updated concurrently; re-read and retry")]
    ConcurrentUpdate,
    /// The requested transition is not allowed from the current status.
    #[error("invalid transition: cannot {action} a page in status {from:?}")]
    InvalidTransition {
        from: PageStatus,
        action: &'static str,
    },
}

/// Metadata recorded alongside a stored page blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBlob {
    pub size: u64,
    pub format: String,
}

/// Record a new submission on the page.
///
/// Allowed only from `Not Submitted` or `Rejected`. Increments the submission
/// count and clears any prior automated or human verdict. The caller supplies
/// the submission count it read; a mismatch is rejected rather than silently
/// superseding a concurrent writer.
pub fn submit(
    page: &mut FormPage,
    expected_submission_count: u32,
    blob: SubmittedBlob,
) -> Result<(), PageError> {
    if page.submission_count != expected_submission_count {
        return Err(PageError::StaleSubmission {
            expected: expected_submission_count,
            found: page.submission_count,
        });
    }
    match page.status {
        PageStatus::NotSubmitted | PageStatus::Rejected => {}
        from => {
            return Err(PageError::InvalidTransition {
                from,
                action: "submit",
            })
        }
    }

    page.status = PageStatus::Submitted;
    page.submission_count += 1;
    page.submitted_size = Some(blob.size);
    page.submitted_format = Some(blob.format);
    page.system_check = None;
    Ok(())
}

/// Attach an automated pre-check verdict to a submitted page.
///
/// Advisory only: the page status is unchanged. Intake policy decides whether
/// a rejected check also rejects the page.
pub fn apply_system_check(
    page: &mut FormPage,
    verdict: SystemCheckStatus,
) -> Result<(), PageError> {
    if page.status != PageStatus::Submitted {
        return Err(PageError::InvalidTransition {
            from: page.status,
            action: "system-check",
        });
    }
    page.system_check = Some(verdict);
    Ok(())
}

/// Accept a submitted page. Terminal for this submission count.
pub fn accept(page: &mut FormPage) -> Result<(), PageError> {
    if page.status != PageStatus::Submitted {
        return Err(PageError::InvalidTransition {
            from: page.status,
            action: "accept",
        });
    }
    page.status = PageStatus::Accepted;
    Ok(())
}

/// Reject a submitted page, reopening it for applicant resubmission.
pub fn reject(page: &mut FormPage) -> Result<(), PageError> {
    if page.status != PageStatus::Submitted {
        return Err(PageError::InvalidTransition {
            from: page.status,
            action: "reject",
        });
    }
    page.status = PageStatus::Rejected;
    Ok(())
}

/// Reopen an accepted page after an admin overturns the earlier verdict.
///
/// This is the only path out of `Accepted`: the page drops back to
/// `Submitted` so a fresh verdict (or rejection and resubmission) can follow.
pub fn reopen(page: &mut FormPage) -> Result<(), PageError> {
    if page.status != PageStatus::Accepted {
        return Err(PageError::InvalidTransition {
            from: page.status,
            action: "reopen",
        });
    }
    page.status = PageStatus::Submitted;
    Ok(())
}
