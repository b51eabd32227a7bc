//! Doctor workflow.
//!
//! Menu driven through the buttons of the greeting template. Agenda and
//! message lookups are slow, so they run as deferred tasks and answer on
//! their own once the webhook has been acknowledged. Asking for another
//! day's agenda is a two-step dialogue:
//!
//! ```text
//! (no state) --"Revisar agenda otro día"--> waiting_for_date --date--> (no state)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{error, warn};

use super::date::{parse_date_input, DateInput};
use super::{DeferredTasks, Workflow, WorkflowContext, WorkflowError, SERVICE_UNAVAILABLE_REPLY};
use crate::auth::AuthenticatedUser;
use crate::formatters::{format_agenda, format_message_threads};
use crate::messaging::TemplateMessage;
use crate::observability::interaction;

pub const ROLE: &str = "doctor";

pub const BUTTON_AGENDA_TODAY: &str = "Revisar mi agenda del día";
pub const BUTTON_AGENDA_OTHER_DAY: &str = "Revisar agenda otro día";
pub const BUTTON_MESSAGES: &str = "Revisar mis recados";
const BUTTONS_IN_PROGRESS: [&str; 2] = ["Consultar cita paciente", "Consultar mis boxes"];

/// Step while the doctor is expected to type a date.
pub const STEP_WAITING_FOR_DATE: &str = "waiting_for_date";

const GREETING_TEMPLATE: &str = "respuesta_inicial_doctores";
const TEMPLATE_LANGUAGE: &str = "es";

pub const DATE_PROMPT: &str =
    "📅 ¿Qué día quieres revisar? Escribe la fecha en formato DD-MM-AA (por ejemplo 05-02-26).";
pub const DATE_RETRY_PROMPT: &str =
    "No entendí la fecha. Escríbela en formato DD-MM-AA, por ejemplo 05-02-26.";
pub const INVALID_DATE_REPLY: &str =
    "❌ La fecha ingresada no es válida. Vuelve a elegir la opción para intentarlo de nuevo.";
pub const IN_PROGRESS_REPLY: &str = "Estamos trabajando en esta opción 🚧";
pub const UNRECOGNIZED_REPLY: &str = "Opción no reconocida";

pub struct DoctorWorkflow {
    ctx: Arc<WorkflowContext>,
}

impl DoctorWorkflow {
    pub const fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    async fn greet(&self, user: &AuthenticatedUser, phone: &str) -> Result<(), WorkflowError> {
        let template = TemplateMessage::new(GREETING_TEMPLATE, TEMPLATE_LANGUAGE)
            .with_header_param(user.display_name.clone());
        self.ctx.messaging.send_template(phone, &template).await?;
        Ok(())
    }

    async fn handle_date_input(
        &self,
        user: &AuthenticatedUser,
        phone: &str,
        text: &str,
        deferred: &mut DeferredTasks,
    ) -> Result<(), WorkflowError> {
        match parse_date_input(text) {
            DateInput::Valid(date) => {
                self.ctx.conversation.clear(phone).await?;
                let detail = date.to_string();
                interaction::workflow_action(phone, ROLE, "agenda_other_day", Some(&detail));
                self.defer_agenda(user, phone, date, deferred);
            }
            DateInput::Invalid => {
                self.ctx.conversation.clear(phone).await?;
                self.ctx.messaging.send_text(phone, INVALID_DATE_REPLY).await?;
            }
            DateInput::Unrecognized => {
                self.ctx.messaging.send_text(phone, DATE_RETRY_PROMPT).await?;
            }
        }
        Ok(())
    }

    fn defer_agenda(
        &self,
        user: &AuthenticatedUser,
        phone: &str,
        date: NaiveDate,
        deferred: &mut DeferredTasks,
    ) {
        let when = if date == self.ctx.today() {
            "hoy".to_string()
        } else {
            format!("el {}", date.format("%d-%m-%Y"))
        };
        deferred.push(
            "doctor.agenda",
            send_agenda(Arc::clone(&self.ctx), user.clone(), phone.to_string(), date, when),
        );
    }
}

#[async_trait]
impl Workflow for DoctorWorkflow {
    fn role(&self) -> &'static str {
        ROLE
    }

    async fn handle_text(
        &self,
        user: &AuthenticatedUser,
        phone: &str,
        text: &str,
        deferred: &mut DeferredTasks,
    ) -> Result<(), WorkflowError> {
        match self.ctx.conversation.get(phone).await? {
            Some(state) if state.is_step(STEP_WAITING_FOR_DATE) => {
                self.handle_date_input(user, phone, text, deferred).await
            }
            Some(state) => {
                warn!(phone, step = %state.step, "Unknown conversation step, resetting");
                self.ctx.conversation.clear(phone).await?;
                self.greet(user, phone).await
            }
            None => self.greet(user, phone).await,
        }
    }

    async fn handle_button(
        &self,
        user: &AuthenticatedUser,
        phone: &str,
        label: &str,
        deferred: &mut DeferredTasks,
    ) -> Result<(), WorkflowError> {
        match label {
            BUTTON_AGENDA_TODAY => {
                interaction::workflow_action(phone, ROLE, "agenda_today", None);
                self.defer_agenda(user, phone, self.ctx.today(), deferred);
            }
            BUTTON_AGENDA_OTHER_DAY => {
                self.ctx
                    .conversation
                    .set(phone, STEP_WAITING_FOR_DATE, None)
                    .await?;
                interaction::workflow_action(phone, ROLE, "await_date", None);
                self.ctx.messaging.send_text(phone, DATE_PROMPT).await?;
            }
            BUTTON_MESSAGES => {
                interaction::workflow_action(phone, ROLE, "message_threads", None);
                deferred.push(
                    "doctor.message_threads",
                    send_message_threads(Arc::clone(&self.ctx), user.clone(), phone.to_string()),
                );
            }
            label if BUTTONS_IN_PROGRESS.contains(&label) => {
                self.ctx.messaging.send_text(phone, IN_PROGRESS_REPLY).await?;
            }
            _ => {
                self.ctx.messaging.send_text(phone, UNRECOGNIZED_REPLY).await?;
            }
        }
        Ok(())
    }
}

async fn send_agenda(
    ctx: Arc<WorkflowContext>,
    user: AuthenticatedUser,
    phone: String,
    date: NaiveDate,
    when: String,
) {
    let reply = match ctx.scheduling.agenda(&user, date).await {
        Ok(records) => format_agenda(&records, &ctx.schema, &user.display_name, &when),
        Err(e) => {
            error!(phone = %phone, %date, error = %e, "Agenda lookup failed");
            SERVICE_UNAVAILABLE_REPLY.to_string()
        }
    };
    if let Err(e) = ctx.messaging.send_text(&phone, &reply).await {
        error!(phone = %phone, error = %e, "Failed to deliver agenda");
    }
}

async fn send_message_threads(ctx: Arc<WorkflowContext>, user: AuthenticatedUser, phone: String) {
    let reply = match ctx.scheduling.message_threads(&user).await {
        Ok(records) => format_message_threads(&records, &ctx.schema, &user.display_name),
        Err(e) => {
            error!(phone = %phone, error = %e, "Message thread lookup failed");
            SERVICE_UNAVAILABLE_REPLY.to_string()
        }
    };
    if let Err(e) = ctx.messaging.send_text(&phone, &reply).await {
        error!(phone = %phone, error = %e, "Failed to deliver message threads");
    }
}
