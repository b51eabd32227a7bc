//! Fakes shared by the workflow unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::WorkflowContext;
use crate::auth::AuthenticatedUser;
use crate::cache::MemoryStore;
use crate::conversation::{ConversationStore, DEFAULT_TTL};
use crate::messaging::{MessagingError, MessagingGateway, TemplateMessage};
use crate::resilience::BreakerOpen;
use crate::scheduling::{Record, SchedulingDirectory, SchedulingError, SchedulingSchema};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        to: String,
        body: String,
    },
    Template {
        to: String,
        name: String,
        header_params: Vec<String>,
    },
}

#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Text messages as (to, body).
    pub fn texts(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { to, body } => Some((to, body)),
                Sent::Template { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), MessagingError> {
        self.sent.lock().unwrap().push(Sent::Text {
            to: to.into(),
            body: body.into(),
        });
        Ok(())
    }

    async fn send_template(
        &self,
        to: &str,
        template: &TemplateMessage,
    ) -> Result<(), MessagingError> {
        self.sent.lock().unwrap().push(Sent::Template {
            to: to.into(),
            name: template.name.clone(),
            header_params: template.header_params.clone(),
        });
        Ok(())
    }
}

/// Directory with no records that remembers the agenda dates asked for.
#[derive(Default)]
pub struct StubDirectory {
    agenda_dates: Mutex<Vec<NaiveDate>>,
    failing: AtomicBool,
}

impl StubDirectory {
    pub fn agenda_dates(&self) -> Vec<NaiveDate> {
        self.agenda_dates.lock().unwrap().clone()
    }

    /// Make every later lookup fail as if the breaker were open.
    pub fn fail_lookups(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SchedulingError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulingError::CircuitOpen(BreakerOpen {
                name: "scheduling".into(),
                retry_in: std::time::Duration::from_secs(30),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl SchedulingDirectory for StubDirectory {
    async fn find_staff_by_phone(
        &self,
        _phone: &str,
    ) -> Result<Option<AuthenticatedUser>, SchedulingError> {
        self.check()?;
        Ok(None)
    }

    async fn agenda(
        &self,
        _user: &AuthenticatedUser,
        date: NaiveDate,
    ) -> Result<Vec<Record>, SchedulingError> {
        self.check()?;
        self.agenda_dates.lock().unwrap().push(date);
        Ok(Vec::new())
    }

    async fn message_threads(
        &self,
        _user: &AuthenticatedUser,
    ) -> Result<Vec<Record>, SchedulingError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn check_session(&self) -> Result<(), SchedulingError> {
        self.check()
    }

    async fn close_session(&self) -> Result<(), SchedulingError> {
        Ok(())
    }
}

pub struct Harness {
    pub context: Arc<WorkflowContext>,
    pub gateway: Arc<RecordingGateway>,
    pub directory: Arc<StubDirectory>,
}

pub fn harness() -> Harness {
    let gateway = Arc::new(RecordingGateway::default());
    let directory = Arc::new(StubDirectory::default());
    let context = Arc::new(WorkflowContext {
        messaging: gateway.clone(),
        scheduling: directory.clone(),
        conversation: ConversationStore::new(Arc::new(MemoryStore::new()), DEFAULT_TTL),
        schema: SchedulingSchema::default(),
        timezone: chrono_tz::America::Santiago,
    });
    Harness {
        context,
        gateway,
        directory,
    }
}

pub fn user(role: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        phone: "56912345678".into(),
        external_id: "42".into(),
        display_name: "Ana Pérez".into(),
        role: role.into(),
    }
}
