//! Server Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;

use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::scheduling::SchedulingSchema;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// Deployment environment; "production" switches logs to JSON
    pub environment: String,

    /// Redis connection URL
    pub redis_url: String,

    /// Scheduling database base URL (e.g., "https://fm.example.com")
    pub fm_base_url: String,

    /// Scheduling database name, as it appears in request paths
    pub fm_database: String,

    pub fm_username: String,

    pub fm_password: String,

    /// Layouts and fields used in scheduling queries
    pub scheduling_schema: SchedulingSchema,

    /// Lifetime of a scheduling session token in seconds (default: 900)
    pub fm_token_lifetime_secs: u64,

    /// Seconds subtracted from the token lifetime when caching (default: 60)
    pub fm_token_safety_margin_secs: u64,

    /// Messaging API base URL (default: "https://graph.facebook.com")
    pub wsp_api_base_url: String,

    /// Messaging API version (default: "v24.0")
    pub wsp_api_version: String,

    /// Sending phone number id
    pub wsp_phone_id: String,

    /// Messaging API access token
    pub wsp_token: String,

    /// Token expected on webhook verification requests
    pub wsp_verify_token: String,

    /// Application secret used to sign webhook deliveries
    pub wsp_app_secret: String,

    /// Longest inbound text handed to a workflow, in characters (default: 500)
    pub max_message_length: usize,

    /// Processed-message marker lifetime in seconds (default: 86400 = 1 day)
    pub dedup_ttl_secs: u64,

    /// Conversation state idle lifetime in seconds (default: 1800 = 30 min)
    pub conversation_ttl_secs: u64,

    /// Cached staff lookup lifetime in seconds (default: 300 = 5 min)
    pub auth_cache_ttl_secs: u64,

    /// Consecutive failures that open a circuit breaker (default: 5)
    pub breaker_failure_threshold: u32,

    /// Seconds an open breaker waits before a trial call (default: 30)
    pub breaker_recovery_secs: u64,

    /// Attempts per external call, including the first (default: 3)
    pub retry_max_attempts: u32,

    /// Backoff before the first retry in milliseconds (default: 1000)
    pub retry_base_backoff_ms: u64,

    /// Connect timeout for external calls in seconds (default: 10)
    pub http_connect_timeout_secs: u64,

    /// Total timeout for external calls in seconds (default: 30)
    pub http_read_timeout_secs: u64,

    /// Time zone of the clinic's calendar (default: America/Santiago)
    pub clinic_timezone: Tz,

    /// Whether readiness also requires a scheduling session (default: false)
    pub readiness_check_scheduling: bool,
}

/// Parse an optional variable, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let fm_host = env_string("FM_HOST", "fmsk.skinmed.cl");
        let timezone = env_string("CLINIC_TIMEZONE", "America/Santiago");

        let config = Self {
            bind_address: env_string("BIND_ADDRESS", "0.0.0.0:8080"),
            environment: env_string("ENVIRONMENT", "development"),
            redis_url: env_string("REDIS_URL", "redis://localhost:6379/0"),
            fm_base_url: env::var("FM_BASE_URL").unwrap_or_else(|_| format!("https://{fm_host}")),
            fm_database: env_string("FM_DB", "Agenda%20v20b"),
            fm_username: env::var("FM_USER").context("FM_USER must be set")?,
            fm_password: env::var("FM_PASS").context("FM_PASS must be set")?,
            scheduling_schema: schema_from_env(),
            fm_token_lifetime_secs: env_or("FM_TOKEN_LIFETIME_SECS", 900),
            fm_token_safety_margin_secs: env_or("FM_TOKEN_SAFETY_MARGIN_SECS", 60),
            wsp_api_base_url: env_string("WSP_API_BASE_URL", "https://graph.facebook.com"),
            wsp_api_version: env_string("META_API_VERSION", "v24.0"),
            wsp_phone_id: env::var("WSP_PHONE_ID").context("WSP_PHONE_ID must be set")?,
            wsp_token: env::var("WSP_TOKEN").context("WSP_TOKEN must be set")?,
            wsp_verify_token: env::var("WSP_VERIFY_TOKEN")
                .context("WSP_VERIFY_TOKEN must be set")?,
            wsp_app_secret: env::var("WSP_APP_SECRET").context("WSP_APP_SECRET must be set")?,
            max_message_length: env_or("MAX_MESSAGE_LENGTH", 500),
            dedup_ttl_secs: env_or("DEDUP_TTL_SECS", 86_400),
            conversation_ttl_secs: env_or("CONVERSATION_TTL_SECS", 1800),
            auth_cache_ttl_secs: env_or("AUTH_CACHE_TTL_SECS", 300),
            breaker_failure_threshold: env_or("BREAKER_FAILURE_THRESHOLD", 5),
            breaker_recovery_secs: env_or("BREAKER_RECOVERY_SECS", 30),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", 3),
            retry_base_backoff_ms: env_or("RETRY_BASE_BACKOFF_MS", 1000),
            http_connect_timeout_secs: env_or("HTTP_CONNECT_TIMEOUT_SECS", 10),
            http_read_timeout_secs: env_or("HTTP_READ_TIMEOUT_SECS", 30),
            clinic_timezone: timezone
                .parse()
                .map_err(|_| anyhow!("CLINIC_TIMEZONE is not a valid time zone: {timezone}"))?,
            readiness_check_scheduling: env_or("READINESS_CHECK_SCHEDULING", false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if self.fm_token_safety_margin_secs >= self.fm_token_lifetime_secs {
            bail!(
                "FM_TOKEN_SAFETY_MARGIN_SECS ({}) must be lower than FM_TOKEN_LIFETIME_SECS ({})",
                self.fm_token_safety_margin_secs,
                self.fm_token_lifetime_secs
            );
        }
        if self.max_message_length == 0 {
            bail!("MAX_MESSAGE_LENGTH must be positive");
        }
        if self.wsp_app_secret.is_empty() {
            bail!("WSP_APP_SECRET must not be empty");
        }
        Ok(())
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            self.breaker_failure_threshold,
            Duration::from_secs(self.breaker_recovery_secs),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_backoff_ms),
        )
    }

    /// Create a default configuration for testing.
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            environment: "test".into(),
            redis_url: "redis://localhost:6380".into(),
            fm_base_url: "http://127.0.0.1:9".into(),
            fm_database: "Agenda".into(),
            fm_username: "api".into(),
            fm_password: "test-password".into(),
            scheduling_schema: SchedulingSchema::default(),
            fm_token_lifetime_secs: 900,
            fm_token_safety_margin_secs: 60,
            wsp_api_base_url: "http://127.0.0.1:9".into(),
            wsp_api_version: "v24.0".into(),
            wsp_phone_id: "123456".into(),
            wsp_token: "test-token".into(),
            wsp_verify_token: "test-verify-token".into(),
            wsp_app_secret: "test-app-secret".into(),
            max_message_length: 500,
            dedup_ttl_secs: 86_400,
            conversation_ttl_secs: 1800,
            auth_cache_ttl_secs: 300,
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 30,
            retry_max_attempts: 1,
            retry_base_backoff_ms: 1,
            http_connect_timeout_secs: 1,
            http_read_timeout_secs: 2,
            clinic_timezone: chrono_tz::America::Santiago,
            readiness_check_scheduling: false,
        }
    }
}

/// Scheduling schema with per-name environment overrides.
fn schema_from_env() -> SchedulingSchema {
    let defaults = SchedulingSchema::default();
    SchedulingSchema {
        auth_layout: env_string("FM_AUTH_LAYOUT", &defaults.auth_layout),
        agenda_layout: env_string("FM_AGENDA_LAYOUT", &defaults.agenda_layout),
        messages_layout: env_string("FM_MESSAGES_LAYOUT", &defaults.messages_layout),
        staff_phone_field: env_string("FM_STAFF_PHONE_FIELD", &defaults.staff_phone_field),
        staff_id_field: env_string("FM_STAFF_ID_FIELD", &defaults.staff_id_field),
        staff_name_field: env_string("FM_STAFF_NAME_FIELD", &defaults.staff_name_field),
        staff_role_field: env_string("FM_STAFF_ROLE_FIELD", &defaults.staff_role_field),
        agenda_phone_field: env_string("FM_AGENDA_PHONE_FIELD", &defaults.agenda_phone_field),
        agenda_date_field: env_string("FM_AGENDA_DATE_FIELD", &defaults.agenda_date_field),
        agenda_omit_types: env::var("FM_AGENDA_OMIT_TYPES").map_or(defaults.agenda_omit_types, |v| {
            v.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        }),
        agenda_type_field: env_string("FM_AGENDA_TYPE_FIELD", &defaults.agenda_type_field),
        agenda_time_field: env_string("FM_AGENDA_TIME_FIELD", &defaults.agenda_time_field),
        agenda_activity_field: env_string(
            "FM_AGENDA_ACTIVITY_FIELD",
            &defaults.agenda_activity_field,
        ),
        patient_first_name_field: env_string(
            "FM_PATIENT_FIRST_NAME_FIELD",
            &defaults.patient_first_name_field,
        ),
        patient_last_name_field: env_string(
            "FM_PATIENT_LAST_NAME_FIELD",
            &defaults.patient_last_name_field,
        ),
        messages_phone_field: env_string(
            "FM_MESSAGES_PHONE_FIELD",
            &defaults.messages_phone_field,
        ),
        messages_text_field: env_string(
            "FM_MESSAGES_TEXT_FIELD",
            &defaults.messages_text_field,
        ),
        date_format: env_string("FM_DATE_FORMAT", &defaults.date_format),
        phone_prefix: env_string("FM_PHONE_PREFIX", &defaults.phone_prefix),
        exact_phone_match: env_or("FM_EXACT_PHONE_MATCH", defaults.exact_phone_match),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const REQUIRED: [(&str, &str); 6] = [
        ("FM_USER", "api"),
        ("FM_PASS", "pass"),
        ("WSP_TOKEN", "token"),
        ("WSP_PHONE_ID", "123"),
        ("WSP_VERIFY_TOKEN", "verify"),
        ("WSP_APP_SECRET", "secret"),
    ];

    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        for (k, v) in vars {
            env::set_var(k, v);
        }
        let out = f();
        for (k, _) in vars {
            env::remove_var(k);
        }
        out
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        let config = with_env(&REQUIRED, Config::from_env).unwrap();
        assert_eq!(config.fm_base_url, "https://fmsk.skinmed.cl");
        assert_eq!(config.wsp_api_version, "v24.0");
        assert_eq!(config.max_message_length, 500);
        assert_eq!(config.dedup_ttl_secs, 86_400);
        assert_eq!(config.clinic_timezone, chrono_tz::America::Santiago);
        assert_eq!(config.scheduling_schema.agenda_layout, "ListadoDeHoras_dapi");
        assert!(!config.is_production());
    }

    #[test]
    #[serial]
    fn test_missing_required_variable() {
        let err = with_env(&REQUIRED[1..], Config::from_env).unwrap_err();
        assert!(err.to_string().contains("FM_USER must be set"));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("FM_HOST", "fm.test"),
            ("FM_AGENDA_LAYOUT", "Agenda_api"),
            ("FM_AGENDA_OMIT_TYPES", "Eliminada, No Viene"),
            ("FM_EXACT_PHONE_MATCH", "true"),
            ("FM_AGENDA_TIME_FIELD", "HoraInicio"),
            ("FM_MESSAGES_TEXT_FIELD", "Recado"),
            ("ENVIRONMENT", "production"),
        ]);
        let config = with_env(&vars, Config::from_env).unwrap();
        assert_eq!(config.fm_base_url, "https://fm.test");
        assert_eq!(config.scheduling_schema.agenda_layout, "Agenda_api");
        assert_eq!(
            config.scheduling_schema.agenda_omit_types,
            vec!["Eliminada", "No Viene"]
        );
        assert!(config.scheduling_schema.exact_phone_match);
        assert_eq!(config.scheduling_schema.agenda_time_field, "HoraInicio");
        assert_eq!(config.scheduling_schema.messages_text_field, "Recado");
        assert_eq!(config.scheduling_schema.agenda_activity_field, "Actividad");
        assert!(config.is_production());
    }

    #[test]
    #[serial]
    fn test_invalid_settings_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FM_TOKEN_SAFETY_MARGIN_SECS", "900"));
        assert!(with_env(&vars, Config::from_env).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("CLINIC_TIMEZONE", "Mars/Olympus"));
        assert!(with_env(&vars, Config::from_env).is_err());
    }

    #[test]
    fn test_default_for_test_is_valid() {
        Config::default_for_test().validate().unwrap();
    }
}
