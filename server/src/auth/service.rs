//! Staff lookup with a short-lived cache in front of the directory.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use super::AuthenticatedUser;
use crate::cache::{get_json, set_json, CacheStore};
use crate::observability::interaction::{self, AuthStatus};
use crate::scheduling::{SchedulingDirectory, SchedulingError};

/// Default lifetime of a cached staff lookup.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Authenticates senders against the staff directory.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CacheStore>,
    directory: Arc<dyn SchedulingDirectory>,
    ttl: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        directory: Arc<dyn SchedulingDirectory>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            ttl,
        }
    }

    /// Staff member registered with `phone`, or `None` when unregistered.
    ///
    /// Only successful lookups are cached; a phone that is not found is asked
    /// again next time so newly registered staff are picked up immediately.
    #[instrument(skip(self))]
    pub async fn get_user_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<AuthenticatedUser>, SchedulingError> {
        let key = Self::key(phone);
        match get_json::<AuthenticatedUser>(self.store.as_ref(), &key).await {
            Ok(Some(user)) => {
                interaction::auth(
                    phone,
                    AuthStatus::Cached,
                    Some(&user.display_name),
                    Some(&user.role),
                );
                return Ok(Some(user));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Auth cache read failed"),
        }

        let user = match self.directory.find_staff_by_phone(phone).await {
            Ok(user) => user,
            Err(e) => {
                interaction::auth(phone, AuthStatus::Error, None, None);
                return Err(e);
            }
        };

        match &user {
            Some(user) => {
                if let Err(e) = set_json(self.store.as_ref(), &key, user, Some(self.ttl)).await {
                    warn!(error = %e, "Failed to cache staff lookup");
                }
                interaction::auth(
                    phone,
                    AuthStatus::Success,
                    Some(&user.display_name),
                    Some(&user.role),
                );
            }
            None => interaction::auth(phone, AuthStatus::NotFound, None, None),
        }

        Ok(user)
    }

    fn key(phone: &str) -> String {
        format!("auth:user:{phone}")
    }
}
