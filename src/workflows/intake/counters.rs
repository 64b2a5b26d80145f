//! Dashboard counter engine.
//!
//! Counters are a derived cache over applicant, action, and message state.
//! Every update arrives as an explicit transition event carrying a unique id;
//! applying the same id twice is a no-op so upstream aggregators can deliver
//! at least once. Drift is repaired by `reconcile`, a full recomputation from
//! the underlying entities.

use serde::{Deserialize, Serialize};

use super::domain::{Applicant, ApplicantStatus, DashboardCounters, EventId};

/// One counter delta derived from an entity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterDelta {
    /// An applicant joined the dashboard; `applicants` is monotonic.
    ApplicantAdded,
    /// An applicant's rolled-up status moved between buckets.
    ApplicantStatusChanged {
        from: ApplicantStatus,
        to: ApplicantStatus,
    },
    ActionOpened,
    ActionClosed,
    /// A message left `Pending` for a terminal delivery status.
    MessageResolved,
}

/// Transition event addressed to one dashboard's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEvent {
    pub id: EventId,
    pub delta: CounterDelta,
}

impl CounterEvent {
    pub fn new(id: impl Into<String>, delta: CounterDelta) -> Self {
        Self {
            id: EventId(id.into()),
            delta,
        }
    }
}

/// Result of applying an event; duplicates are success, not failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    Applied,
    Duplicate,
}

/// Apply one transition event to the counters, idempotently by event id.
pub fn apply(counters: &mut DashboardCounters, event: &CounterEvent) -> CounterOutcome {
    if counters.applied_events.contains(&event.id) {
        return CounterOutcome::Duplicate;
    }

    match event.delta {
        CounterDelta::ApplicantAdded => {
            counters.applicants += 1;
        }
        CounterDelta::ApplicantStatusChanged { from, to } => {
            debit_status(counters, from);
            credit_status(counters, to);
        }
        CounterDelta::ActionOpened => {
            counters.actions += 1;
        }
        CounterDelta::ActionClosed => {
            counters.actions = counters.actions.saturating_sub(1);
        }
        CounterDelta::MessageResolved => {
            counters.messages_sent += 1;
        }
    }

    counters.applied_events.insert(event.id.clone());
    CounterOutcome::Applied
}

fn credit_status(counters: &mut DashboardCounters, status: ApplicantStatus) {
    match status {
        // Applicants who have not submitted anything sit in neither bucket.
        ApplicantStatus::NotSubmitted => {}
        ApplicantStatus::Incomplete => counters.incomplete_applicants += 1,
        ApplicantStatus::Complete => counters.complete_applicants += 1,
    }
}

fn debit_status(counters: &mut DashboardCounters, status: ApplicantStatus) {
    match status {
        ApplicantStatus::NotSubmitted => {}
        ApplicantStatus::Incomplete => {
            counters.incomplete_applicants = counters.incomplete_applicants.saturating_sub(1);
        }
        ApplicantStatus::Complete => {
            counters.complete_applicants = counters.complete_applicants.saturating_sub(1);
        }
    }
}

/// Repair pass: recompute every counter from a scan of the dashboard's
/// applicants, open actions, and resolved messages.
///
/// The applied-event ledger is kept so that late redeliveries of events
/// counted before the repair still dedupe afterwards.
pub fn reconcile<'a, I>(
    counters: &mut DashboardCounters,
    applicants: I,
    open_actions: u64,
    resolved_messages: u64,
) where
    I: IntoIterator<Item = &'a Applicant>,
{
    let mut total = 0;
    let mut complete = 0;
    let mut incomplete = 0;
    for applicant in applicants {
        total += 1;
        match applicant.dashboard.status {
            ApplicantStatus::NotSubmitted => {}
            ApplicantStatus::Incomplete => incomplete += 1,
            ApplicantStatus::Complete => complete += 1,
        }
    }

    counters.applicants = total;
    counters.complete_applicants = complete;
    counters.incomplete_applicants = incomplete;
    counters.actions = open_actions;
    counters.messages_sent = resolved_messages;
}
