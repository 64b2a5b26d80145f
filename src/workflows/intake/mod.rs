//! Applicant document intake: page/document/applicant state machines, the
//! admin review workflow, dashboard counters, and message delivery tracking.

pub mod applicant;
pub mod counters;
pub mod document;
pub mod domain;
pub mod messaging;
pub mod page;
pub mod repository;
pub mod review;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use applicant::{applicant_status, ApplicantTransition};
pub use counters::{CounterDelta, CounterEvent, CounterOutcome};
pub use document::{document_status, DocumentTransition};
pub use domain::{
    Action, ActionId, ActionKind, AdminCheck, AdminCheckId, AdminCheckStatus, Applicant,
    ApplicantId, ApplicantStatus, Company, CompanyId, CompletedBy, Dashboard, DashboardCounters,
    DashboardId, DeviceKind, DocFormat, DocumentSpec, DocumentStatus, DraftDashboard, Form,
    FormDoc, FormId, FormPage, Invite, Message, MessageDeliveryStatus, MessageId, PageStatus,
    PersonName, PublishError, PublishedDashboard, SystemCheckStatus, SystemTask, UserId,
};
pub use messaging::{DeliveryCallback, DeliveryOutcome};
pub use page::{PageError, SubmittedBlob};
pub use repository::{
    BlobError, BlobRef, BlobStore, DeliveryError, IntakeStore, MemoryBlobStore,
    MemoryDeliveryProvider, MemoryInfra, MemoryReviewQueue, MemoryStore, MessageDeliveryProvider,
    QueueError, ReviewQueue, StoreError, Versioned,
};
pub use review::{AdminVerdict, ReviewError};
pub use router::intake_router;
pub use service::{IntakeError, IntakePolicy, IntakeService};
