use super::common::*;
use crate::workflows::intake::domain::{PageStatus, SystemCheckStatus};
use crate::workflows::intake::page::{self, PageError, SubmittedBlob};

fn blob() -> SubmittedBlob {
    SubmittedBlob {
        size: 4_096,
        format: "image/jpeg".to_string(),
    }
}

#[test]
fn submit_moves_fresh_page_to_submitted() {
    let mut page = page_in(PageStatus::NotSubmitted, 0, 1);

    page::submit(&mut page, 0, blob()).expect("fresh page accepts a submission");

    assert_eq!(page.status, PageStatus::Submitted);
    assert_eq!(page.submission_count, 1);
    assert_eq!(page.submitted_size, Some(4_096));
    assert_eq!(page.submitted_format.as_deref(), Some("image/jpeg"));
}

#[test]
fn resubmit_after_rejection_clears_prior_verdicts() {
    let mut page = checked(
        page_in(PageStatus::Rejected, 1, 1),
        SystemCheckStatus::Rejected,
    );

    page::submit(&mut page, 1, blob()).expect("rejected page accepts a resubmission");

    assert_eq!(page.status, PageStatus::Submitted);
    assert_eq!(page.submission_count, 2);
    assert_eq!(page.system_check, None);
}

#[test]
fn submit_with_stale_count_is_rejected() {
    let mut page = page_in(PageStatus::Rejected, 3, 1);

    let result = page::submit(&mut page, 2, blob());

    assert_eq!(
        result,
        Err(PageError::StaleSubmission {
            expected: 2,
            found: 3
        })
    );
    assert_eq!(page.submission_count, 3);
}

#[test]
fn submit_is_invalid_from_submitted_and_accepted() {
    for status in [PageStatus::Submitted, PageStatus::Accepted] {
        let mut page = page_in(status, 1, 1);
        let result = page::submit(&mut page, 1, blob());
        assert!(
            matches!(result, Err(PageError::InvalidTransition { from, .. }) if from == status),
            "submit from {status:?} must fail"
        );
    }
}

#[test]
fn system_check_only_applies_to_submitted_pages() {
    let mut page = page_in(PageStatus::Submitted, 1, 1);
    page::apply_system_check(&mut page, SystemCheckStatus::Accepted).expect("check applies");
    assert_eq!(page.system_check, Some(SystemCheckStatus::Accepted));
    assert_eq!(page.status, PageStatus::Submitted);

    let mut fresh = page_in(PageStatus::NotSubmitted, 0, 1);
    let result = page::apply_system_check(&mut fresh, SystemCheckStatus::Accepted);
    assert!(matches!(result, Err(PageError::InvalidTransition { .. })));
}

#[test]
fn accept_and_reject_require_a_submitted_page() {
    let mut page = page_in(PageStatus::Submitted, 1, 1);
    page::accept(&mut page).expect("submitted page can be accepted");
    assert_eq!(page.status, PageStatus::Accepted);

    let result = page::reject(&mut page);
    assert!(matches!(result, Err(PageError::InvalidTransition { .. })));

    let mut rejected = page_in(PageStatus::Rejected, 1, 1);
    assert!(page::accept(&mut rejected).is_err());
}

#[test]
fn reopen_is_the_only_exit_from_accepted() {
    let mut page = page_in(PageStatus::Accepted, 2, 1);
    page::reopen(&mut page).expect("accepted page reopens");
    assert_eq!(page.status, PageStatus::Submitted);
    assert_eq!(page.submission_count, 2);

    let mut submitted = page_in(PageStatus::Submitted, 1, 1);
    assert!(matches!(
        page::reopen(&mut submitted),
        Err(PageError::InvalidTransition { .. })
    ));
}
