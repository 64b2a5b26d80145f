//! Collaborator interfaces for the intake engine.
//!
//! The document store, blob store, review queue, and delivery provider are
//! abstractions so the service module can be exercised in isolation. The
//! store exposes per-entity reads and version-conditional writes; optimistic
//! versioning is the concurrency control, there are no in-process locks held
//! across operations.
//!
//! In-memory implementations live here (not behind `cfg(test)`) because the
//! demo command and the default server wiring run against them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::{
    Action, ActionId, AdminCheck, AdminCheckId, Applicant, ApplicantId, Company, CompanyId,
    Dashboard, DashboardId, Form, FormId, Message, MessageId,
};

/// Entity paired with the version the reader observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub entity: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, entity: T) -> Self {
        Self { version, entity }
    }
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("entity not found")]
    NotFound,
    #[error("entity already exists")]
    Conflict,
    /// A conditional write lost the race; the caller must re-read and retry.
    #[error("version conflict: wrote against {expected}, store holds {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-entity get/put with version-conditional writes.
///
/// `put_*` methods take the `Versioned` the caller read and return the new
/// version on success; a mismatch yields `VersionConflict` instead of a
/// silent overwrite.
pub trait IntakeStore: Send + Sync {
    fn insert_company(&self, company: Company) -> Result<(), StoreError>;
    fn get_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError>;

    fn insert_dashboard(&self, company: &CompanyId, dashboard: Dashboard)
        -> Result<(), StoreError>;
    fn get_dashboard(
        &self,
        company: &CompanyId,
        id: &DashboardId,
    ) -> Result<Option<Versioned<Dashboard>>, StoreError>;
    fn put_dashboard(
        &self,
        company: &CompanyId,
        dashboard: Versioned<Dashboard>,
    ) -> Result<u64, StoreError>;

    fn insert_applicant(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
        applicant: Applicant,
    ) -> Result<(), StoreError>;
    fn get_applicant(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
        id: &ApplicantId,
    ) -> Result<Option<Versioned<Applicant>>, StoreError>;
    fn put_applicant(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
        applicant: Versioned<Applicant>,
    ) -> Result<u64, StoreError>;
    fn list_applicants(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
    ) -> Result<Vec<Applicant>, StoreError>;

    fn insert_form(&self, form: Form) -> Result<(), StoreError>;
    fn get_form(&self, id: &FormId) -> Result<Option<Versioned<Form>>, StoreError>;
    fn put_form(&self, form: Versioned<Form>) -> Result<u64, StoreError>;

    fn insert_admin_check(&self, check: AdminCheck) -> Result<(), StoreError>;
    fn get_admin_check(
        &self,
        id: &AdminCheckId,
    ) -> Result<Option<Versioned<AdminCheck>>, StoreError>;
    fn put_admin_check(&self, check: Versioned<AdminCheck>) -> Result<u64, StoreError>;
    /// Open (non-terminal) check for a dashboard/applicant pair, if any.
    fn find_open_admin_check(
        &self,
        dashboard: &DashboardId,
        applicant: &ApplicantId,
    ) -> Result<Option<Versioned<AdminCheck>>, StoreError>;

    fn insert_action(&self, action: Action) -> Result<(), StoreError>;
    fn get_action(&self, id: &ActionId) -> Result<Option<Versioned<Action>>, StoreError>;
    fn put_action(&self, action: Versioned<Action>) -> Result<u64, StoreError>;
    fn list_open_actions(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
    ) -> Result<Vec<Action>, StoreError>;

    fn insert_message(&self, message: Message) -> Result<(), StoreError>;
    fn get_message(&self, id: &MessageId) -> Result<Option<Versioned<Message>>, StoreError>;
    fn put_message(&self, message: Versioned<Message>) -> Result<u64, StoreError>;
    fn list_messages(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
    ) -> Result<Vec<Message>, StoreError>;
}

/// Content reference handed back by the blob store for a submitted page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub reference: String,
    pub size: u64,
}

/// Blob storage failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Accepts submitted page bytes and returns a content reference and size.
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<BlobRef, BlobError>;
}

/// Review-queue dispatch failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("review queue unavailable: {0}")]
    Unavailable(String),
}

/// Accepts actions for dispatch to a human worker.
pub trait ReviewQueue: Send + Sync {
    fn enqueue(&self, action: &Action) -> Result<(), QueueError>;
}

/// Outbound delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery provider unavailable: {0}")]
    Unavailable(String),
}

/// Accepts a message for sending; delivery resolves later via callback.
pub trait MessageDeliveryProvider: Send + Sync {
    fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}

type Table<K, V> = Mutex<HashMap<K, (u64, V)>>;

fn get_versioned<K, V>(table: &Table<K, V>, key: &K) -> Result<Option<Versioned<V>>, StoreError>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    let guard = table.lock().map_err(poisoned)?;
    Ok(guard
        .get(key)
        .map(|(version, entity)| Versioned::new(*version, entity.clone())))
}

fn insert_new<K, V>(table: &Table<K, V>, key: K, value: V) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq,
{
    let mut guard = table.lock().map_err(poisoned)?;
    if guard.contains_key(&key) {
        return Err(StoreError::Conflict);
    }
    guard.insert(key, (1, value));
    Ok(())
}

fn put_conditional<K, V>(table: &Table<K, V>, key: K, value: Versioned<V>) -> Result<u64, StoreError>
where
    K: std::hash::Hash + Eq,
{
    let mut guard = table.lock().map_err(poisoned)?;
    let slot = guard.get_mut(&key).ok_or(StoreError::NotFound)?;
    if slot.0 != value.version {
        return Err(StoreError::VersionConflict {
            expected: value.version,
            found: slot.0,
        });
    }
    slot.0 += 1;
    slot.1 = value.entity;
    Ok(slot.0)
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("store mutex poisoned".to_string())
}

/// In-memory store backing the demo command, default server wiring, and tests.
#[derive(Default)]
pub struct MemoryStore {
    companies: Table<CompanyId, Company>,
    dashboards: Table<(CompanyId, DashboardId), Dashboard>,
    applicants: Table<(CompanyId, DashboardId, ApplicantId), Applicant>,
    forms: Table<FormId, Form>,
    admin_checks: Table<AdminCheckId, AdminCheck>,
    actions: Table<ActionId, Action>,
    messages: Table<MessageId, Message>,
}

impl IntakeStore for MemoryStore {
    fn insert_company(&self, company: Company) -> Result<(), StoreError> {
        insert_new(&self.companies, company.id.clone(), company)
    }

    fn get_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(get_versioned(&self.companies, id)?.map(|versioned| versioned.entity))
    }

    fn insert_dashboard(
        &self,
        company: &CompanyId,
        dashboard: Dashboard,
    ) -> Result<(), StoreError> {
        let key = (company.clone(), dashboard.id().clone());
        insert_new(&self.dashboards, key, dashboard)
    }

    fn get_dashboard(
        &self,
        company: &CompanyId,
        id: &DashboardId,
    ) -> Result<Option<Versioned<Dashboard>>, StoreError> {
        get_versioned(&self.dashboards, &(company.clone(), id.clone()))
    }

    fn put_dashboard(
        &self,
        company: &CompanyId,
        dashboard: Versioned<Dashboard>,
    ) -> Result<u64, StoreError> {
        let key = (company.clone(), dashboard.entity.id().clone());
        put_conditional(&self.dashboards, key, dashboard)
    }

    fn insert_applicant(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
        applicant: Applicant,
    ) -> Result<(), StoreError> {
        let key = (company.clone(), dashboard.clone(), applicant.id.clone());
        insert_new(&self.applicants, key, applicant)
    }

    fn get_applicant(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
        id: &ApplicantId,
    ) -> Result<Option<Versioned<Applicant>>, StoreError> {
        get_versioned(
            &self.applicants,
            &(company.clone(), dashboard.clone(), id.clone()),
        )
    }

    fn put_applicant(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
        applicant: Versioned<Applicant>,
    ) -> Result<u64, StoreError> {
        let key = (
            company.clone(),
            dashboard.clone(),
            applicant.entity.id.clone(),
        );
        put_conditional(&self.applicants, key, applicant)
    }

    fn list_applicants(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
    ) -> Result<Vec<Applicant>, StoreError> {
        let guard = self.applicants.lock().map_err(poisoned)?;
        let mut rows: Vec<Applicant> = guard
            .iter()
            .filter(|((c, d, _), _)| c == company && d == dashboard)
            .map(|(_, (_, applicant))| applicant.clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn insert_form(&self, form: Form) -> Result<(), StoreError> {
        insert_new(&self.forms, form.id.clone(), form)
    }

    fn get_form(&self, id: &FormId) -> Result<Option<Versioned<Form>>, StoreError> {
        get_versioned(&self.forms, id)
    }

    fn put_form(&self, form: Versioned<Form>) -> Result<u64, StoreError> {
        put_conditional(&self.forms, form.entity.id.clone(), form)
    }

    fn insert_admin_check(&self, check: AdminCheck) -> Result<(), StoreError> {
        insert_new(&self.admin_checks, check.id.clone(), check)
    }

    fn get_admin_check(
        &self,
        id: &AdminCheckId,
    ) -> Result<Option<Versioned<AdminCheck>>, StoreError> {
        get_versioned(&self.admin_checks, id)
    }

    fn put_admin_check(&self, check: Versioned<AdminCheck>) -> Result<u64, StoreError> {
        put_conditional(&self.admin_checks, check.entity.id.clone(), check)
    }

    fn find_open_admin_check(
        &self,
        dashboard: &DashboardId,
        applicant: &ApplicantId,
    ) -> Result<Option<Versioned<AdminCheck>>, StoreError> {
        let guard = self.admin_checks.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|(_, check)| {
                &check.dashboard.id == dashboard
                    && &check.applicant.id == applicant
                    && !check.admin_check_status.is_terminal()
            })
            .map(|(version, check)| Versioned::new(*version, check.clone()))
            .next())
    }

    fn insert_action(&self, action: Action) -> Result<(), StoreError> {
        insert_new(&self.actions, action.id.clone(), action)
    }

    fn get_action(&self, id: &ActionId) -> Result<Option<Versioned<Action>>, StoreError> {
        get_versioned(&self.actions, id)
    }

    fn put_action(&self, action: Versioned<Action>) -> Result<u64, StoreError> {
        put_conditional(&self.actions, action.entity.id.clone(), action)
    }

    fn list_open_actions(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
    ) -> Result<Vec<Action>, StoreError> {
        let guard = self.actions.lock().map_err(poisoned)?;
        let mut rows: Vec<Action> = guard
            .values()
            .filter(|(_, action)| {
                &action.company_id == company
                    && &action.dashboard_id == dashboard
                    && !action.is_complete
            })
            .map(|(_, action)| action.clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        insert_new(&self.messages, message.id.clone(), message)
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Versioned<Message>>, StoreError> {
        get_versioned(&self.messages, id)
    }

    fn put_message(&self, message: Versioned<Message>) -> Result<u64, StoreError> {
        put_conditional(&self.messages, message.entity.id.clone(), message)
    }

    fn list_messages(
        &self,
        company: &CompanyId,
        dashboard: &DashboardId,
    ) -> Result<Vec<Message>, StoreError> {
        let guard = self.messages.lock().map_err(poisoned)?;
        let mut rows: Vec<Message> = guard
            .values()
            .filter(|(_, message)| {
                &message.company_id == company && &message.dashboard_id == dashboard
            })
            .map(|(_, message)| message.clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }
}

/// In-memory blob store keyed by submission path.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .ok()
            .and_then(|guard| guard.get(key).cloned())
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<BlobRef, BlobError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|_| BlobError::Unavailable("blob mutex poisoned".to_string()))?;
        guard.insert(key.to_string(), bytes.to_vec());
        Ok(BlobRef {
            reference: key.to_string(),
            size: bytes.len() as u64,
        })
    }
}

/// In-memory review queue recording enqueued actions in order.
#[derive(Default)]
pub struct MemoryReviewQueue {
    queued: Mutex<Vec<Action>>,
}

impl MemoryReviewQueue {
    pub fn queued(&self) -> Vec<Action> {
        self.queued.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl ReviewQueue for MemoryReviewQueue {
    fn enqueue(&self, action: &Action) -> Result<(), QueueError> {
        self.queued
            .lock()
            .map_err(|_| QueueError::Unavailable("queue mutex poisoned".to_string()))?
            .push(action.clone());
        Ok(())
    }
}

/// In-memory delivery provider recording sent message ids in order.
#[derive(Default)]
pub struct MemoryDeliveryProvider {
    sent: Mutex<Vec<MessageId>>,
}

impl MemoryDeliveryProvider {
    pub fn sent(&self) -> Vec<MessageId> {
        self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl MessageDeliveryProvider for MemoryDeliveryProvider {
    fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .map_err(|_| DeliveryError::Unavailable("provider mutex poisoned".to_string()))?
            .push(message.id.clone());
        Ok(())
    }
}

/// Arc-wrapped memory infrastructure bundle for demos and tests.
pub struct MemoryInfra {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub queue: Arc<MemoryReviewQueue>,
    pub delivery: Arc<MemoryDeliveryProvider>,
}

impl Default for MemoryInfra {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            blobs: Arc::new(MemoryBlobStore::default()),
            queue: Arc::new(MemoryReviewQueue::default()),
            delivery: Arc::new(MemoryDeliveryProvider::default()),
        }
    }
}
