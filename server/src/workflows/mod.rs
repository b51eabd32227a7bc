//! Role Workflows
//!
//! One conversational state machine per staff role. The orchestrator resolves
//! the sender's role through the [`RoleRegistry`] and hands the event to the
//! workflow it returns.

pub mod date;
pub mod deferred;
pub mod doctor;
pub mod manager;
pub mod nurse;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use deferred::DeferredTasks;
pub use registry::{default_registry, RegistryError, RoleRegistry, WorkflowFactory};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::auth::AuthenticatedUser;
use crate::cache::CacheError;
use crate::conversation::ConversationStore;
use crate::messaging::{MessagingError, MessagingGateway};
use crate::resilience::{Fault, FaultKind};
use crate::scheduling::{SchedulingDirectory, SchedulingError, SchedulingSchema};

/// Reply sent when a dependency is down or a lookup failed.
pub const SERVICE_UNAVAILABLE_REPLY: &str =
    "⚠️ El servicio no está disponible en este momento. Por favor intenta más tarde.";

/// Errors raised while handling an event inside a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("conversation state error: {0}")]
    State(#[from] CacheError),
}

impl Fault for WorkflowError {
    fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Scheduling(e) => e.fault_kind(),
            Self::Messaging(e) => e.fault_kind(),
            Self::State(e) => e.fault_kind(),
        }
    }
}

/// Collaborators shared by every workflow instance.
pub struct WorkflowContext {
    pub messaging: Arc<dyn MessagingGateway>,
    pub scheduling: Arc<dyn SchedulingDirectory>,
    pub conversation: ConversationStore,
    /// Field names used when rendering scheduling records
    pub schema: SchedulingSchema,
    /// Time zone the clinic's calendar days are counted in
    pub timezone: Tz,
}

impl WorkflowContext {
    /// Today's date at the clinic.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

/// Capabilities every role workflow provides.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Role key this workflow was registered under.
    fn role(&self) -> &'static str;

    /// Free-text message from `user`.
    async fn handle_text(
        &self,
        user: &AuthenticatedUser,
        phone: &str,
        text: &str,
        deferred: &mut DeferredTasks,
    ) -> Result<(), WorkflowError>;

    /// Button press; `label` is the button's visible title.
    async fn handle_button(
        &self,
        user: &AuthenticatedUser,
        phone: &str,
        label: &str,
        deferred: &mut DeferredTasks,
    ) -> Result<(), WorkflowError>;
}
