//! Role to workflow registry.
//!
//! Filled once at startup and read-only afterwards. Role keys are compared
//! case-insensitively after trimming.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::{doctor, manager, nurse, Workflow, WorkflowContext};

/// Builds a workflow instance for one event.
pub type WorkflowFactory = Box<dyn Fn(Arc<WorkflowContext>) -> Box<dyn Workflow> + Send + Sync>;

/// Registry configuration errors; fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a workflow is already registered for role '{0}'")]
    DuplicateRole(String),

    #[error("role key must not be empty")]
    EmptyRole,
}

/// Maps role keys to workflow factories.
pub struct RoleRegistry {
    context: Arc<WorkflowContext>,
    factories: HashMap<String, WorkflowFactory>,
}

impl RoleRegistry {
    pub fn new(context: Arc<WorkflowContext>) -> Self {
        Self {
            context,
            factories: HashMap::new(),
        }
    }

    fn normalize(role: &str) -> String {
        role.trim().to_lowercase()
    }

    /// Register `factory` for `role`.
    pub fn register<F>(&mut self, role: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(Arc<WorkflowContext>) -> Box<dyn Workflow> + Send + Sync + 'static,
    {
        let key = Self::normalize(role);
        if key.is_empty() {
            return Err(RegistryError::EmptyRole);
        }
        if self.factories.contains_key(&key) {
            return Err(RegistryError::DuplicateRole(key));
        }
        info!(role = %key, "Workflow registered");
        self.factories.insert(key, Box::new(factory));
        Ok(())
    }

    /// Workflow for `role`, or `None` if no workflow handles it.
    pub fn resolve(&self, role: &str) -> Option<Box<dyn Workflow>> {
        self.factories
            .get(&Self::normalize(role))
            .map(|factory| factory(Arc::clone(&self.context)))
    }

    /// Registered role keys, sorted.
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.factories.keys().cloned().collect();
        roles.sort();
        roles
    }
}

/// Registry with every workflow shipped with the service.
pub fn default_registry(context: Arc<WorkflowContext>) -> Result<RoleRegistry, RegistryError> {
    let mut registry = RoleRegistry::new(context);
    registry.register(doctor::ROLE, |ctx| Box::new(doctor::DoctorWorkflow::new(ctx)))?;
    registry.register(manager::ROLE, |ctx| Box::new(manager::ManagerWorkflow::new(ctx)))?;
    registry.register(nurse::ROLE, |ctx| Box::new(nurse::NurseWorkflow::new(ctx)))?;
    Ok(registry)
}
