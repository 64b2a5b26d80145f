//! Service composing the state machines, aggregators, and collaborators.
//!
//! Every mutation follows the same shape: read versioned entities, run the
//! page/document/applicant chain in memory, then persist with conditional
//! writes so concurrent writers surface as stale errors instead of lost
//! updates. Counter deltas are emitted as idempotent events after the entity
//! writes commit; counter failures are logged and left to the reconcile
//! repair pass rather than failing the applicant's request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::applicant::{self, ApplicantTransition};
use super::counters::{self, CounterDelta, CounterEvent, CounterOutcome};
use super::document;
use super::domain::{
    Action, ActionId, ActionKind, ActionRef, AdminCheck, AdminCheckId, Applicant,
    ApplicantDashboardState, ApplicantId, ApplicantStatus, CompanyId, CompletedBy, Dashboard,
    DashboardCounters, DashboardId, DeviceKind, DocumentId, DocumentSpec, DocumentStatus, Form,
    FormApplicantContext, FormCompanyContext, FormDashboardContext, FormDoc, FormId, FormPage,
    Invite, LatestMessage, Message, MessageDeliveryStatus, MessageId, PageStatus, PersonName,
    PublishError, PublishedDashboard, Recipient, RecipientKind, SystemCheckStatus, SystemTask,
    WorkerDocId,
};
use super::messaging::{self, DeliveryCallback, DeliveryOutcome};
use super::page::{self, PageError, SubmittedBlob};
use super::repository::{
    BlobError, BlobStore, DeliveryError, IntakeStore, MessageDeliveryProvider, QueueError,
    ReviewQueue, StoreError, Versioned,
};
use super::review::{self, AdminVerdict, ReviewError};

/// Policy knobs for the automated side of page intake.
#[derive(Debug, Clone)]
pub struct IntakePolicy {
    /// Reject a page outright when its automated pre-check fails.
    pub auto_reject_failed_checks: bool,
    /// Upper bound on a single submitted page, in bytes.
    pub max_page_bytes: u64,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            auto_reject_failed_checks: true,
            max_page_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Error raised by the intake service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },
    #[error("dashboard {0} is not published")]
    NotPublished(DashboardId),
    #[error("dashboard {0} is already published")]
    AlreadyPublished(DashboardId),
    #[error("form has no document slot named {slot}")]
    UnknownSlot { slot: String },
    #[error("slot {slot} expects pages 1..={page_count}, got page {page_number}")]
    PageOutOfRange {
        slot: String,
        page_number: u32,
        page_count: u32,
    },
    #[error("slot {slot} does not accept {declared} uploads")]
    UnsupportedFormat { slot: String, declared: String },
    #[error("submitted page is {size} bytes, above the {limit} byte limit")]
    PageTooLarge { size: u64, limit: u64 },
    #[error("form {0} has nothing to review")]
    NothingToReview(FormId),
    #[error("invite {invite} was issued for a different dashboard")]
    InviteMismatch { invite: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

static ENTITY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let id = ENTITY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

/// Orchestrates intake, review, messaging, and counter maintenance.
pub struct IntakeService<S, B, Q, M> {
    store: Arc<S>,
    blobs: Arc<B>,
    queue: Arc<Q>,
    delivery: Arc<M>,
    policy: IntakePolicy,
}

impl<S, B, Q, M> IntakeService<S, B, Q, M>
where
    S: IntakeStore + 'static,
    B: BlobStore + 'static,
    Q: ReviewQueue + 'static,
    M: MessageDeliveryProvider + 'static,
{
    pub fn new(
        store: Arc<S>,
        blobs: Arc<B>,
        queue: Arc<Q>,
        delivery: Arc<M>,
        policy: IntakePolicy,
    ) -> Self {
        Self {
            store,
            blobs,
            queue,
            delivery,
            policy,
        }
    }

    // ------------------------------------------------------------------
    // Dashboard lifecycle
    // ------------------------------------------------------------------

    /// Publish a draft dashboard: one-way, freezes form content and the
    /// opening message, and zeroes the counters.
    pub fn publish_dashboard(
        &self,
        company_id: &CompanyId,
        dashboard_id: &DashboardId,
    ) -> Result<PublishedDashboard, IntakeError> {
        let now = Utc::now();
        let stored = self
            .store
            .get_dashboard(company_id, dashboard_id)?
            .ok_or_else(|| not_found("dashboard", dashboard_id))?;

        let draft = match stored.entity {
            Dashboard::Draft(draft) => draft,
            Dashboard::Published(_) => {
                return Err(IntakeError::AlreadyPublished(dashboard_id.clone()))
            }
        };

        let published = draft.publish(now)?;
        self.store.put_dashboard(
            company_id,
            Versioned::new(stored.version, Dashboard::Published(published.clone())),
        )?;

        // Applicants seeded on the draft get their form and opening message
        // now that the dashboard is live.
        let mut events = Vec::new();
        for applicant_id in &published.applicants {
            let mut applicant = match self
                .store
                .get_applicant(company_id, dashboard_id, applicant_id)?
            {
                Some(applicant) => applicant,
                None => continue,
            };
            if applicant.entity.form_id.is_some() {
                continue;
            }
            let form =
                self.create_form(company_id, dashboard_id, &published, &applicant.entity, now)?;
            applicant.entity.doc_ids = form
                .docs
                .iter()
                .map(|(slot, doc)| (slot.clone(), doc.id.clone()))
                .collect();
            applicant.entity.form_id = Some(form.id);
            self.send_opening_message(company_id, &published, &mut applicant.entity, now)?;
            self.store
                .put_applicant(company_id, dashboard_id, applicant)?;
            events.push(CounterEvent::new(
                format!("applicant:{applicant_id}:added"),
                CounterDelta::ApplicantAdded,
            ));
        }
        self.apply_counter_events(company_id, dashboard_id, events);
        info!(dashboard = %dashboard_id, "dashboard published");

        Ok(published)
    }

    /// Add an applicant to a live dashboard: creates their form with every
    /// slot defaulted to `Not Submitted`, sends the opening message, and
    /// bumps the applicants counter.
    pub fn add_applicant(
        &self,
        company_id: &CompanyId,
        dashboard_id: &DashboardId,
        email: impl Into<String>,
        name: Option<PersonName>,
    ) -> Result<Applicant, IntakeError> {
        let now = Utc::now();
        let stored = self
            .store
            .get_dashboard(company_id, dashboard_id)?
            .ok_or_else(|| not_found("dashboard", dashboard_id))?;
        let published = match &stored.entity {
            Dashboard::Published(published) => published.clone(),
            Dashboard::Draft(_) => return Err(IntakeError::NotPublished(dashboard_id.clone())),
        };

        let applicant_id = ApplicantId(next_id("applicant"));

        let mut applicant = Applicant {
            id: applicant_id.clone(),
            created_at: now,
            email: email.into(),
            name,
            latest_message: None,
            actions: Vec::new(),
            dashboard: ApplicantDashboardState {
                id: dashboard_id.clone(),
                status: ApplicantStatus::NotSubmitted,
                submitted_at: None,
            },
            doc_ids: Default::default(),
            form_id: None,
        };

        let form = self.create_form(company_id, dashboard_id, &published, &applicant, now)?;
        applicant.doc_ids = form
            .docs
            .iter()
            .map(|(slot, doc)| (slot.clone(), doc.id.clone()))
            .collect();
        applicant.form_id = Some(form.id);

        let message = self.send_opening_message(company_id, &published, &mut applicant, now)?;
        self.store
            .insert_applicant(company_id, dashboard_id, applicant.clone())?;

        // Track membership on the dashboard record as well.
        let mut dashboard = stored;
        if let Dashboard::Published(published) = &mut dashboard.entity {
            published.applicants.push(applicant_id.clone());
        }
        self.store.put_dashboard(company_id, dashboard)?;

        self.apply_counter_events(
            company_id,
            dashboard_id,
            vec![CounterEvent::new(
                format!("applicant:{applicant_id}:added"),
                CounterDelta::ApplicantAdded,
            )],
        );
        info!(applicant = %applicant_id, dashboard = %dashboard_id, message = %message, "applicant enrolled");

        Ok(applicant)
    }

    /// Accept an invite, enrolling the invitee on the invite's dashboard.
    pub fn accept_invite(&self, invite: Invite) -> Result<Applicant, IntakeError> {
        let dashboard = self
            .store
            .get_dashboard(&invite.company.id, &invite.dashboard_id)?
            .ok_or_else(|| not_found("dashboard", &invite.dashboard_id))?;
        if !dashboard.entity.is_published() {
            return Err(IntakeError::InviteMismatch {
                invite: invite.id.to_string(),
            });
        }
        self.add_applicant(
            &invite.company.id,
            &invite.dashboard_id,
            invite.email,
            invite.name,
        )
    }

    // ------------------------------------------------------------------
    // Page intake
    // ------------------------------------------------------------------

    /// Store a page's bytes and run the submit transition plus the full
    /// aggregation chain, all against the versions the caller read.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_page(
        &self,
        form_id: &FormId,
        slot: &str,
        page_number: u32,
        expected_submission_count: u32,
        bytes: &[u8],
        declared_format: &str,
        device: DeviceKind,
    ) -> Result<Form, IntakeError> {
        let now = Utc::now();
        let mut form = self
            .store
            .get_form(form_id)?
            .ok_or_else(|| not_found("form", form_id))?;
        let spec = self.slot_spec(&form.entity, slot)?;

        if page_number == 0 || page_number > spec.page_count {
            return Err(IntakeError::PageOutOfRange {
                slot: slot.to_string(),
                page_number,
                page_count: spec.page_count,
            });
        }
        if !spec.format.accepts(declared_format) {
            return Err(IntakeError::UnsupportedFormat {
                slot: slot.to_string(),
                declared: declared_format.to_string(),
            });
        }
        let size = bytes.len() as u64;
        if size > self.policy.max_page_bytes {
            return Err(IntakeError::PageTooLarge {
                size,
                limit: self.policy.max_page_bytes,
            });
        }

        let blob_key = format!(
            "companies/{}/dashboards/{}/applicants/{}/{}/{}/{}",
            form.entity.company.id,
            form.entity.dashboard.id,
            form.entity.applicant.id,
            slot,
            page_number,
            expected_submission_count + 1,
        );

        let doc = form
            .entity
            .docs
            .get_mut(slot)
            .ok_or_else(|| IntakeError::UnknownSlot {
                slot: slot.to_string(),
            })?;
        let page = doc
            .pages
            .entry(page_number)
            .or_insert_with(|| FormPage::new(slot, page_number));

        // Reject stale or out-of-order submissions before touching the blob
        // store, so a losing writer leaves no orphaned upload.
        if page.submission_count != expected_submission_count {
            return Err(PageError::StaleSubmission {
                expected: expected_submission_count,
                found: page.submission_count,
            }
            .into());
        }
        let blob = self.blobs.put(&blob_key, bytes)?;

        page::submit(
            page,
            expected_submission_count,
            SubmittedBlob {
                size: blob.size,
                format: declared_format.to_string(),
            },
        )?;
        if doc.device_submitted.is_none() {
            doc.device_submitted = Some(device);
        }

        let updated = self.persist_chain(form, slot, &spec, now)?;
        self.maybe_open_admin_check(&updated, slot, &spec)?;
        Ok(updated)
    }

    /// Attach an automated pre-check verdict to a submitted page. Depending
    /// on policy, a failed check also rejects the page.
    pub fn apply_system_check(
        &self,
        form_id: &FormId,
        slot: &str,
        page_number: u32,
        verdict: SystemCheckStatus,
    ) -> Result<Form, IntakeError> {
        let now = Utc::now();
        let mut form = self
            .store
            .get_form(form_id)?
            .ok_or_else(|| not_found("form", form_id))?;
        let spec = self.slot_spec(&form.entity, slot)?;

        let page = lookup_page(&mut form.entity, slot, page_number)?;
        page::apply_system_check(page, verdict)?;
        if verdict == SystemCheckStatus::Rejected && self.policy.auto_reject_failed_checks {
            page::reject(page)?;
        }

        let updated = self.persist_chain(form, slot, &spec, now)?;
        self.maybe_open_admin_check(&updated, slot, &spec)?;
        Ok(updated)
    }

    /// Accept a submitted live page and roll the result up the chain.
    pub fn accept_page(
        &self,
        form_id: &FormId,
        slot: &str,
        page_number: u32,
    ) -> Result<Form, IntakeError> {
        self.verdict_page(form_id, slot, page_number, page::accept)
    }

    /// Reject a submitted live page, reopening it for resubmission.
    pub fn reject_page(
        &self,
        form_id: &FormId,
        slot: &str,
        page_number: u32,
    ) -> Result<Form, IntakeError> {
        self.verdict_page(form_id, slot, page_number, page::reject)
    }

    fn verdict_page(
        &self,
        form_id: &FormId,
        slot: &str,
        page_number: u32,
        transition: fn(&mut FormPage) -> Result<(), PageError>,
    ) -> Result<Form, IntakeError> {
        let now = Utc::now();
        let mut form = self
            .store
            .get_form(form_id)?
            .ok_or_else(|| not_found("form", form_id))?;
        let spec = self.slot_spec(&form.entity, slot)?;

        let page = lookup_page(&mut form.entity, slot, page_number)?;
        transition(page)?;

        self.persist_chain(form, slot, &spec, now)
    }

    // ------------------------------------------------------------------
    // Admin check workflow
    // ------------------------------------------------------------------

    /// Snapshot the form into an admin check and dispatch one action per
    /// reviewable document. Idempotent per dashboard/applicant pair: an
    /// already-open check is reused, with its snapshot refreshed so pages
    /// submitted after it was taken become reviewable too.
    pub fn open_admin_check(&self, form_id: &FormId) -> Result<AdminCheck, IntakeError> {
        let now = Utc::now();
        let form = self
            .store
            .get_form(form_id)?
            .ok_or_else(|| not_found("form", form_id))?;

        if let Some(mut existing) = self
            .store
            .find_open_admin_check(&form.entity.dashboard.id, &form.entity.applicant.id)?
        {
            let snapshot_slots: Vec<String> = existing.entity.docs.keys().cloned().collect();
            if !review::refresh_admin_check(&mut existing.entity, &form.entity) {
                return Ok(existing.entity);
            }
            let check = existing.entity.clone();
            self.store
                .put_admin_check(existing)
                .map_err(stale_check_on_conflict)?;
            let new_slots: Vec<String> = check
                .docs
                .keys()
                .filter(|slot| !snapshot_slots.contains(slot))
                .cloned()
                .collect();
            if !new_slots.is_empty() {
                self.dispatch_check_actions(&check, &form.entity, &new_slots, now)?;
            }
            debug!(check = %check.id, docs = check.docs.len(), "admin check snapshot refreshed");
            return Ok(check);
        }

        let check_id = AdminCheckId(next_id("admincheck"));
        let check = review::build_admin_check(check_id, &form.entity, now)
            .ok_or_else(|| IntakeError::NothingToReview(form_id.clone()))?;
        self.store.insert_admin_check(check.clone())?;

        let slots: Vec<String> = check.docs.keys().cloned().collect();
        self.dispatch_check_actions(&check, &form.entity, &slots, now)?;
        info!(check = %check.id, applicant = %check.applicant.id, docs = check.docs.len(), "admin check opened");
        Ok(check)
    }

    /// Open one `verifyDocuments` action per named snapshot document and roll
    /// the new open actions into the applicant's status.
    fn dispatch_check_actions(
        &self,
        check: &AdminCheck,
        form: &Form,
        slots: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), IntakeError> {
        let company_id = form.company.id.clone();
        let dashboard_id = form.dashboard.id.clone();
        let applicant_id = form.applicant.id.clone();

        let mut events = Vec::new();
        let mut refs = Vec::new();
        for slot in slots {
            let doc = match check.docs.get(slot) {
                Some(doc) => doc,
                None => continue,
            };
            let worker_doc = review::project_worker_doc(
                WorkerDocId(next_id("workerdoc")),
                check,
                slot,
                doc,
                now,
            );
            let action = Action {
                id: ActionId(next_id("action")),
                created_at: now,
                kind: ActionKind::VerifyDocuments,
                company_id: company_id.clone(),
                dashboard_id: dashboard_id.clone(),
                applicant_id: applicant_id.clone(),
                applicant_name: form.applicant.name.clone(),
                worker_doc: Some(worker_doc),
                is_complete: false,
                completed_by: None,
            };
            self.store.insert_action(action.clone())?;
            self.queue.enqueue(&action)?;
            events.push(CounterEvent::new(
                format!("action:{}:opened", action.id),
                CounterDelta::ActionOpened,
            ));
            refs.push(ActionRef {
                id: action.id,
                kind: ActionKind::VerifyDocuments,
            });
        }

        // Open actions change the applicant's rolled-up status.
        let mut applicant = self
            .store
            .get_applicant(&company_id, &dashboard_id, &applicant_id)?
            .ok_or_else(|| not_found("applicant", &applicant_id))?;
        applicant.entity.actions.extend(refs);
        let transition = applicant::recompute(
            &mut applicant.entity,
            form.docs.values().map(|doc| doc.status),
            now,
        );
        let version = self
            .store
            .put_applicant(&company_id, &dashboard_id, applicant)?;
        if let Some(transition) = transition {
            events.push(applicant_status_event(&applicant_id, transition, version));
        }

        self.apply_counter_events(&company_id, &dashboard_id, events);
        Ok(())
    }

    /// Record one admin verdict and reconcile it back onto the live form.
    pub fn resolve_admin_page(
        &self,
        check_id: &AdminCheckId,
        slot: &str,
        page_number: u32,
        verdict: AdminVerdict,
        completed_by: CompletedBy,
    ) -> Result<AdminCheck, IntakeError> {
        let now = Utc::now();
        let mut check = self
            .store
            .get_admin_check(check_id)?
            .ok_or_else(|| not_found("admin check", check_id))?;
        let mut form = self
            .store
            .get_form(&check.entity.form_id)?
            .ok_or_else(|| not_found("form", &check.entity.form_id))?;
        let spec = self.slot_spec(&form.entity, slot)?;

        let live_count = form
            .entity
            .docs
            .get(slot)
            .and_then(|doc| doc.pages.get(&page_number))
            .map(|page| page.submission_count)
            .unwrap_or(0);

        let outcome = review::resolve_page(&mut check.entity, slot, page_number, verdict, live_count)?;

        // Write the verdict back onto the live page.
        {
            let page = lookup_page(&mut form.entity, slot, page_number)?;
            match outcome.verdict {
                AdminVerdict::Rejected => match page.status {
                    PageStatus::Submitted => page::reject(page)?,
                    PageStatus::Accepted => page::reopen(page)?,
                    _ => {}
                },
                AdminVerdict::Accepted => {}
            }
        }
        if outcome.doc_status == super::domain::AdminCheckStatus::Accepted {
            // Every page of this snapshot document passed review; accept the
            // corresponding live pages that are still awaiting a verdict.
            let snapshot_pages: Vec<u32> = check
                .entity
                .docs
                .get(slot)
                .map(|doc| doc.pages.keys().copied().collect())
                .unwrap_or_default();
            if let Some(doc) = form.entity.docs.get_mut(slot) {
                for number in snapshot_pages {
                    if let Some(page) = doc.pages.get_mut(&number) {
                        if page.status == PageStatus::Submitted {
                            page::accept(page)?;
                        }
                    }
                }
            }
        }

        self.store
            .put_admin_check(check.clone())
            .map_err(stale_check_on_conflict)?;

        let check_done = check.entity.admin_check_status.is_terminal();
        let company_id = form.entity.company.id.clone();
        let dashboard_id = form.entity.dashboard.id.clone();
        let applicant_id = form.entity.applicant.id.clone();

        let mut events = Vec::new();
        if check_done {
            events.extend(self.complete_check_actions(&check.entity, &completed_by, now)?);
        }

        self.persist_chain(form, slot, &spec, now)?;
        self.apply_counter_events(&company_id, &dashboard_id, events);
        info!(
            check = %check.entity.id,
            applicant = %applicant_id,
            status = check.entity.admin_check_status.label(),
            "admin verdict recorded"
        );
        Ok(check.entity)
    }

    /// Close every open `verifyDocuments` action tied to a finished check.
    fn complete_check_actions(
        &self,
        check: &AdminCheck,
        completed_by: &CompletedBy,
        _now: DateTime<Utc>,
    ) -> Result<Vec<CounterEvent>, IntakeError> {
        let mut events = Vec::new();
        let open = self
            .store
            .list_open_actions(&check.company_id, &check.dashboard.id)?;
        for action in open {
            let belongs = action
                .worker_doc
                .as_ref()
                .map(|doc| doc.admin_check_id == check.id)
                .unwrap_or(false);
            if !belongs {
                continue;
            }
            let mut stored = self
                .store
                .get_action(&action.id)?
                .ok_or_else(|| not_found("action", &action.id))?;
            stored.entity.is_complete = true;
            stored.entity.completed_by = Some(completed_by.clone());
            self.store.put_action(stored)?;
            events.push(CounterEvent::new(
                format!("action:{}:closed", action.id),
                CounterDelta::ActionClosed,
            ));
        }

        // Drop the closed actions from the applicant's open list.
        let mut applicant = self
            .store
            .get_applicant(&check.company_id, &check.dashboard.id, &check.applicant.id)?
            .ok_or_else(|| not_found("applicant", &check.applicant.id))?;
        applicant.entity.actions.retain(|reference| {
            !events
                .iter()
                .any(|event| event.id.0 == format!("action:{}:closed", reference.id))
        });
        self.store
            .put_applicant(&check.company_id, &check.dashboard.id, applicant)?;

        Ok(events)
    }

    /// Close one open follow-up action by hand and roll the applicant's
    /// status forward. Review actions close themselves when their check
    /// finishes; this is the path for the rest, `messageNotSent` above all.
    pub fn complete_action(
        &self,
        action_id: &ActionId,
        completed_by: CompletedBy,
    ) -> Result<Action, IntakeError> {
        let now = Utc::now();
        let mut stored = self
            .store
            .get_action(action_id)?
            .ok_or_else(|| not_found("action", action_id))?;
        if stored.entity.is_complete {
            return Ok(stored.entity);
        }
        stored.entity.is_complete = true;
        stored.entity.completed_by = Some(completed_by);
        let action = stored.entity.clone();
        self.store.put_action(stored)?;

        let mut applicant = self
            .store
            .get_applicant(&action.company_id, &action.dashboard_id, &action.applicant_id)?
            .ok_or_else(|| not_found("applicant", &action.applicant_id))?;
        applicant
            .entity
            .actions
            .retain(|reference| reference.id != action.id);

        let mut events = vec![CounterEvent::new(
            format!("action:{}:closed", action.id),
            CounterDelta::ActionClosed,
        )];
        if let Some(form_id) = applicant.entity.form_id.clone() {
            let mut form = self
                .store
                .get_form(&form_id)?
                .ok_or_else(|| not_found("form", &form_id))?;
            let transition = applicant::recompute(
                &mut applicant.entity,
                form.entity.docs.values().map(|doc| doc.status),
                now,
            );
            form.entity.applicant.status = applicant.entity.dashboard.status;
            self.store.put_form(form)?;
            let version = self.store.put_applicant(
                &action.company_id,
                &action.dashboard_id,
                applicant,
            )?;
            if let Some(transition) = transition {
                events.push(applicant_status_event(&action.applicant_id, transition, version));
            }
        } else {
            self.store
                .put_applicant(&action.company_id, &action.dashboard_id, applicant)?;
        }

        self.apply_counter_events(&action.company_id, &action.dashboard_id, events);
        info!(action = %action.id, applicant = %action.applicant_id, "action completed");
        Ok(action)
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    fn send_opening_message(
        &self,
        company_id: &CompanyId,
        dashboard: &PublishedDashboard,
        applicant: &mut Applicant,
        now: DateTime<Utc>,
    ) -> Result<MessageId, IntakeError> {
        let message_id = MessageId(next_id("message"));
        let message = Message {
            id: message_id.clone(),
            created_at: now,
            company_id: company_id.clone(),
            dashboard_id: dashboard.id.clone(),
            applicant_id: applicant.id.clone(),
            subject: format!("{}: document submission", dashboard.title),
            body: dashboard.messages.opening.clone(),
            from_name: None,
            recipients: vec![Recipient {
                email: applicant.email.clone(),
                kind: Some(RecipientKind::To),
            }],
            updated_at: None,
            response: None,
        };
        self.store.insert_message(message.clone())?;
        self.delivery.send(&message)?;
        applicant.latest_message = Some(LatestMessage {
            id: message_id.clone(),
            status: MessageDeliveryStatus::Pending,
            sent_at: now,
        });
        Ok(message_id)
    }

    /// Apply an asynchronous delivery callback to the applicant's latest
    /// message. Stale callbacks (a newer message exists) are ignored.
    pub fn record_delivery(
        &self,
        company_id: &CompanyId,
        dashboard_id: &DashboardId,
        applicant_id: &ApplicantId,
        callback: DeliveryCallback,
    ) -> Result<DeliveryOutcome, IntakeError> {
        let now = Utc::now();
        let mut applicant = self
            .store
            .get_applicant(company_id, dashboard_id, applicant_id)?
            .ok_or_else(|| not_found("applicant", applicant_id))?;
        let mut message = self
            .store
            .get_message(&callback.message_id)?
            .ok_or_else(|| not_found("message", &callback.message_id))?;

        let outcome =
            messaging::record_delivery(&mut applicant.entity, &mut message.entity, &callback, now);
        let resolved = match outcome {
            DeliveryOutcome::Resolved(status) => status,
            DeliveryOutcome::Ignored => {
                debug!(message = %callback.message_id, "delivery callback ignored");
                return Ok(outcome);
            }
        };

        let mut events = vec![CounterEvent::new(
            format!("message:{}:resolved", callback.message_id),
            CounterDelta::MessageResolved,
        )];

        if resolved == MessageDeliveryStatus::NotDelivered {
            // A failed delivery becomes a human follow-up item.
            let action = Action {
                id: ActionId(next_id("action")),
                created_at: now,
                kind: ActionKind::MessageNotSent,
                company_id: company_id.clone(),
                dashboard_id: dashboard_id.clone(),
                applicant_id: applicant_id.clone(),
                applicant_name: applicant.entity.name.clone(),
                worker_doc: None,
                is_complete: false,
                completed_by: None,
            };
            self.store.insert_action(action.clone())?;
            self.queue.enqueue(&action)?;
            applicant.entity.actions.push(ActionRef {
                id: action.id.clone(),
                kind: ActionKind::MessageNotSent,
            });
            events.push(CounterEvent::new(
                format!("action:{}:opened", action.id),
                CounterDelta::ActionOpened,
            ));
            warn!(applicant = %applicant_id, message = %callback.message_id, "message delivery failed");
        }

        self.store.put_message(message)?;
        self.store
            .put_applicant(company_id, dashboard_id, applicant)?;

        self.apply_counter_events(company_id, dashboard_id, events);
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    /// Current counters for a published dashboard.
    pub fn dashboard_counters(
        &self,
        company_id: &CompanyId,
        dashboard_id: &DashboardId,
    ) -> Result<DashboardCounters, IntakeError> {
        let stored = self
            .store
            .get_dashboard(company_id, dashboard_id)?
            .ok_or_else(|| not_found("dashboard", dashboard_id))?;
        match stored.entity {
            Dashboard::Published(published) => Ok(published.counters),
            Dashboard::Draft(_) => Err(IntakeError::NotPublished(dashboard_id.clone())),
        }
    }

    /// Repair pass: recompute the dashboard's counters from a full scan of
    /// its applicants, open actions, and resolved messages.
    pub fn reconcile_dashboard(
        &self,
        company_id: &CompanyId,
        dashboard_id: &DashboardId,
    ) -> Result<DashboardCounters, IntakeError> {
        let applicants = self.store.list_applicants(company_id, dashboard_id)?;
        let open_actions = self.store.list_open_actions(company_id, dashboard_id)?.len() as u64;
        let resolved_messages = self
            .store
            .list_messages(company_id, dashboard_id)?
            .iter()
            .filter(|message| {
                message
                    .response
                    .as_ref()
                    .map(|response| response.status.is_resolved())
                    .unwrap_or(false)
            })
            .count() as u64;

        for _ in 0..COUNTER_RETRIES {
            let mut stored = self
                .store
                .get_dashboard(company_id, dashboard_id)?
                .ok_or_else(|| not_found("dashboard", dashboard_id))?;
            let published = match &mut stored.entity {
                Dashboard::Published(published) => published,
                Dashboard::Draft(_) => return Err(IntakeError::NotPublished(dashboard_id.clone())),
            };
            counters::reconcile(
                &mut published.counters,
                applicants.iter(),
                open_actions,
                resolved_messages,
            );
            let repaired = published.counters.clone();
            match self.store.put_dashboard(company_id, stored) {
                Ok(_) => {
                    info!(dashboard = %dashboard_id, "counters reconciled");
                    return Ok(repaired);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(IntakeError::Store(StoreError::Unavailable(
            "counter reconciliation kept losing the write race".to_string(),
        )))
    }

    /// Apply counter deltas with bounded retries. Failures are logged, never
    /// surfaced: counters are advisory and the reconcile pass repairs drift.
    fn apply_counter_events(
        &self,
        company_id: &CompanyId,
        dashboard_id: &DashboardId,
        events: Vec<CounterEvent>,
    ) {
        for event in events {
            let mut applied = false;
            for _ in 0..COUNTER_RETRIES {
                let stored = match self.store.get_dashboard(company_id, dashboard_id) {
                    Ok(Some(stored)) => stored,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "counter update failed to read dashboard");
                        break;
                    }
                };
                let mut dashboard = stored;
                let outcome = match &mut dashboard.entity {
                    Dashboard::Published(published) => {
                        counters::apply(&mut published.counters, &event)
                    }
                    Dashboard::Draft(_) => break,
                };
                if outcome == CounterOutcome::Duplicate {
                    debug!(event = %event.id, "duplicate counter event skipped");
                    applied = true;
                    break;
                }
                match self.store.put_dashboard(company_id, dashboard) {
                    Ok(_) => {
                        applied = true;
                        break;
                    }
                    Err(StoreError::VersionConflict { .. }) => continue,
                    Err(err) => {
                        warn!(error = %err, event = %event.id, "counter update failed");
                        break;
                    }
                }
            }
            if !applied {
                warn!(event = %event.id, "counter event dropped; reconcile will repair");
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Build and store the form backing one applicant's submissions, with
    /// every slot defaulted to `Not Submitted` / `createDoc`.
    fn create_form(
        &self,
        company_id: &CompanyId,
        dashboard_id: &DashboardId,
        published: &PublishedDashboard,
        applicant: &Applicant,
        now: DateTime<Utc>,
    ) -> Result<Form, IntakeError> {
        let company = self
            .store
            .get_company(company_id)?
            .ok_or_else(|| not_found("company", company_id))?;
        let docs: std::collections::BTreeMap<String, FormDoc> = published
            .docs
            .iter()
            .map(|(slot, spec)| (slot.clone(), new_form_doc(slot, spec)))
            .collect();

        let form = Form {
            id: FormId(next_id("form")),
            created_at: now,
            applicant: FormApplicantContext {
                id: applicant.id.clone(),
                status: applicant.dashboard.status,
                name: applicant.name.clone(),
                email: applicant.email.clone(),
            },
            company: FormCompanyContext {
                id: company.id.clone(),
                name: company.name.clone(),
                logo: company.logo.clone(),
            },
            dashboard: FormDashboardContext {
                id: dashboard_id.clone(),
                form_content: published.form_content.clone(),
                deadline: published.deadline,
                job: published.job.clone(),
                country: published.country.clone(),
                messages: published.messages.clone(),
            },
            docs,
        };
        self.store.insert_form(form.clone())?;
        Ok(form)
    }

    fn slot_spec(&self, form: &Form, slot: &str) -> Result<DocumentSpec, IntakeError> {
        let dashboard = self
            .store
            .get_dashboard(&form.company.id, &form.dashboard.id)?
            .ok_or_else(|| not_found("dashboard", &form.dashboard.id))?;
        let specs = match dashboard.entity {
            Dashboard::Published(published) => published.docs,
            Dashboard::Draft(draft) => draft.docs,
        };
        specs
            .get(slot)
            .cloned()
            .ok_or_else(|| IntakeError::UnknownSlot {
                slot: slot.to_string(),
            })
    }

    /// Recompute document and applicant status and persist both entities.
    ///
    /// The form and applicant writes are conditional on the versions read at
    /// the start of the operation, which makes the page-to-applicant chain a
    /// single optimistic transaction: any concurrent sibling write forces a
    /// clean retry instead of an aggregate computed from stale pages.
    fn persist_chain(
        &self,
        mut form: Versioned<Form>,
        slot: &str,
        spec: &DocumentSpec,
        now: DateTime<Utc>,
    ) -> Result<Form, IntakeError> {
        let company_id = form.entity.company.id.clone();
        let dashboard_id = form.entity.dashboard.id.clone();
        let applicant_id = form.entity.applicant.id.clone();

        if let Some(doc) = form.entity.docs.get_mut(slot) {
            if let Some(transition) = document::recompute(doc, spec) {
                debug!(
                    slot,
                    from = transition.from.label(),
                    to = transition.to.label(),
                    "document status recomputed"
                );
            }
        }

        let mut applicant = self
            .store
            .get_applicant(&company_id, &dashboard_id, &applicant_id)?
            .ok_or_else(|| not_found("applicant", &applicant_id))?;
        let transition = applicant::recompute(
            &mut applicant.entity,
            form.entity.docs.values().map(|doc| doc.status),
            now,
        );
        form.entity.applicant.status = applicant.entity.dashboard.status;

        self.store
            .put_form(form.clone())
            .map_err(stale_page_on_conflict)?;
        let version = self
            .store
            .put_applicant(&company_id, &dashboard_id, applicant)
            .map_err(stale_page_on_conflict)?;

        if let Some(transition) = transition {
            self.apply_counter_events(
                &company_id,
                &dashboard_id,
                vec![applicant_status_event(&applicant_id, transition, version)],
            );
        }

        Ok(form.entity)
    }

    /// Open a review once a fully submitted document needs human eyes.
    fn maybe_open_admin_check(
        &self,
        form: &Form,
        slot: &str,
        spec: &DocumentSpec,
    ) -> Result<(), IntakeError> {
        let doc = match form.docs.get(slot) {
            Some(doc) => doc,
            None => return Ok(()),
        };
        if doc.status != DocumentStatus::Submitted {
            return Ok(());
        }
        if review::needs_admin_check(doc, spec) {
            self.open_admin_check(&form.id)?;
        }
        Ok(())
    }
}

const COUNTER_RETRIES: usize = 3;

fn new_form_doc(slot: &str, spec: &DocumentSpec) -> FormDoc {
    FormDoc {
        id: DocumentId(next_id("doc")),
        name: slot.to_string(),
        format: spec.format,
        ordinal: spec.ordinal,
        status: DocumentStatus::NotSubmitted,
        system_task: Some(SystemTask::CreateDoc),
        pages: std::collections::BTreeMap::new(),
        device_submitted: None,
    }
}

fn lookup_page<'a>(
    form: &'a mut Form,
    slot: &str,
    page_number: u32,
) -> Result<&'a mut FormPage, IntakeError> {
    let doc = form
        .docs
        .get_mut(slot)
        .ok_or_else(|| IntakeError::UnknownSlot {
            slot: slot.to_string(),
        })?;
    doc.pages
        .get_mut(&page_number)
        .ok_or_else(|| IntakeError::NotFound {
            what: "page",
            id: format!("{slot}/{page_number}"),
        })
}

fn applicant_status_event(
    applicant_id: &ApplicantId,
    transition: ApplicantTransition,
    version: u64,
) -> CounterEvent {
    CounterEvent::new(
        format!(
            "applicant:{}:status:{}->{}:v{}",
            applicant_id,
            transition.from.label(),
            transition.to.label(),
            version
        ),
        CounterDelta::ApplicantStatusChanged {
            from: transition.from,
            to: transition.to,
        },
    )
}

fn not_found(what: &'static str, id: &impl std::fmt::Display) -> IntakeError {
    IntakeError::NotFound {
        what,
        id: id.to_string(),
    }
}

/// A lost write race on a live entity means the caller's read is stale. The
/// store does not report how far ahead the winner got, so no counts are
/// claimed; the caller re-reads and retries.
fn stale_page_on_conflict(err: StoreError) -> IntakeError {
    match err {
        StoreError::VersionConflict { .. } => IntakeError::Page(PageError::ConcurrentUpdate),
        other => other.into(),
    }
}

/// A lost write race on an admin check means the snapshot is superseded.
fn stale_check_on_conflict(err: StoreError) -> IntakeError {
    match err {
        StoreError::VersionConflict { .. } => IntakeError::Review(ReviewError::StaleSnapshot),
        other => other.into(),
    }
}
