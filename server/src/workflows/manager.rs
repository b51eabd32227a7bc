//! Clinic management workflow. Stateless placeholder replies for now.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DeferredTasks, Workflow, WorkflowContext, WorkflowError};
use crate::auth::AuthenticatedUser;

pub const ROLE: &str = "gerencia";

const BUTTON_REPLY: &str = "Funcionalidad de gerente en desarrollo 🚧";

pub struct ManagerWorkflow {
    ctx: Arc<WorkflowContext>,
}

impl ManagerWorkflow {
    pub const fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Workflow for ManagerWorkflow {
    fn role(&self) -> &'static str {
        ROLE
    }

    async fn handle_text(
        &self,
        user: &AuthenticatedUser,
        phone: &str,
        _text: &str,
        _deferred: &mut DeferredTasks,
    ) -> Result<(), WorkflowError> {
        let reply = format!("Hola Gerente {}. Panel en construcción.", user.display_name);
        self.ctx.messaging.send_text(phone, &reply).await?;
        Ok(())
    }

    async fn handle_button(
        &self,
        _user: &AuthenticatedUser,
        phone: &str,
        _label: &str,
        _deferred: &mut DeferredTasks,
    ) -> Result<(), WorkflowError> {
        self.ctx.messaging.send_text(phone, BUTTON_REPLY).await?;
        Ok(())
    }
}
