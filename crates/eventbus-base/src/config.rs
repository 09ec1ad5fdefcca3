//! Event bus configuration.
//!
//! Read-only once built; shared as `Arc<EventBusConfig>` between the
//! registry, the dispatch engine and the transport adapter.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::domain::{EventBusError, EventNameNormalizer, NamingRules, TrimStyle};

/// Default shared topic.
pub const DEFAULT_TOPIC_NAME: &str = "EventBusTopic";
/// Default stripped suffix.
pub const DEFAULT_EVENT_NAME_SUFFIX: &str = "IntegrationEvent";
/// Default retry count for transient broker failures.
pub const DEFAULT_RETRY_COUNT: u32 = 5;
/// Default cap on in-flight message handlers per subscription.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 10;
/// Default receive poll window.
pub const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_millis(1000);

/// Event bus configuration.
#[derive(Clone)]
pub struct EventBusConfig {
    /// Broker connection string.
    pub connection_string: String,
    /// Shared topic every event is published to.
    pub topic_name: String,
    /// Subscriber application name, used to derive subscription names.
    pub subscriber_client_app_name: String,
    /// Name normalisation rules.
    pub naming: NamingRules,
    /// Retries for transient broker failures.
    pub retry_count: u32,
    /// Maximum simultaneous message handlers per subscription.
    pub max_concurrent_calls: usize,
    /// Optional per-message dispatch timeout.
    pub handler_timeout: Option<Duration>,
    /// How long one receive call waits for a message.
    pub receive_wait: Duration,
}

impl EventBusConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> EventBusConfigBuilder {
        EventBusConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `EVENTBUS_CONNECTION_STRING`
    /// - `EVENTBUS_SUBSCRIBER_APP_NAME`
    ///
    /// Optional:
    /// - `EVENTBUS_TOPIC_NAME` (default `EventBusTopic`)
    /// - `EVENTBUS_EVENT_NAME_PREFIX` (default empty)
    /// - `EVENTBUS_EVENT_NAME_SUFFIX` (default `IntegrationEvent`)
    /// - `EVENTBUS_TRIM_STYLE`: `charset` (default) or `literal`
    /// - `EVENTBUS_RETRY_COUNT` (default 5)
    /// - `EVENTBUS_MAX_CONCURRENT_CALLS` (default 10)
    /// - `EVENTBUS_HANDLER_TIMEOUT_MS` (unset means no timeout)
    /// - `EVENTBUS_RECEIVE_WAIT_MS` (default 1000)
    pub fn from_env() -> Result<Self, EventBusError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EventBusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &str| {
            lookup(var)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| EventBusError::ConfigMissing {
                    var: var.to_string(),
                })
        };

        let mut builder = Self::builder()
            .connection_string(required("EVENTBUS_CONNECTION_STRING")?)
            .subscriber_client_app_name(required("EVENTBUS_SUBSCRIBER_APP_NAME")?);

        if let Some(topic) = lookup("EVENTBUS_TOPIC_NAME") {
            builder = builder.topic_name(topic);
        }
        if let Some(prefix) = lookup("EVENTBUS_EVENT_NAME_PREFIX") {
            builder = builder.event_name_prefix(prefix);
        }
        if let Some(suffix) = lookup("EVENTBUS_EVENT_NAME_SUFFIX") {
            builder = builder.event_name_suffix(suffix);
        }
        if let Some(style) = lookup("EVENTBUS_TRIM_STYLE") {
            builder = builder.trim_style(style.parse()?);
        }
        if let Some(count) = lookup("EVENTBUS_RETRY_COUNT") {
            builder = builder.retry_count(parse_var("EVENTBUS_RETRY_COUNT", &count)?);
        }
        if let Some(calls) = lookup("EVENTBUS_MAX_CONCURRENT_CALLS") {
            builder =
                builder.max_concurrent_calls(parse_var("EVENTBUS_MAX_CONCURRENT_CALLS", &calls)?);
        }
        if let Some(ms) = lookup("EVENTBUS_HANDLER_TIMEOUT_MS") {
            let ms: u64 = parse_var("EVENTBUS_HANDLER_TIMEOUT_MS", &ms)?;
            builder = builder.handler_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = lookup("EVENTBUS_RECEIVE_WAIT_MS") {
            let ms: u64 = parse_var("EVENTBUS_RECEIVE_WAIT_MS", &ms)?;
            builder = builder.receive_wait(Duration::from_millis(ms));
        }

        builder.build()
    }

    /// Normaliser built from [`naming`](Self::naming).
    pub fn normalizer(&self) -> EventNameNormalizer {
        EventNameNormalizer::new(self.naming.clone())
    }

    /// Broker subscription name for an event: `{App}.{CanonicalName}`.
    pub fn subscription_name(&self, event_name: &str) -> String {
        format!(
            "{}.{}",
            self.subscriber_client_app_name,
            self.normalizer().normalize(event_name)
        )
    }
}

impl fmt::Debug for EventBusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusConfig")
            .field("connection_string", &"<redacted>")
            .field("topic_name", &self.topic_name)
            .field("subscriber_client_app_name", &self.subscriber_client_app_name)
            .field("naming", &self.naming)
            .field("retry_count", &self.retry_count)
            .field("max_concurrent_calls", &self.max_concurrent_calls)
            .field("handler_timeout", &self.handler_timeout)
            .field("receive_wait", &self.receive_wait)
            .finish()
    }
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, EventBusError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| EventBusError::ConfigInvalid {
            var: var.to_string(),
            reason: format!("{value:?}: {e}"),
        })
}

/// Builder for [`EventBusConfig`].
#[derive(Debug, Default)]
pub struct EventBusConfigBuilder {
    connection_string: Option<String>,
    topic_name: Option<String>,
    subscriber_client_app_name: Option<String>,
    prefix: Option<String>,
    delete_prefix: Option<bool>,
    suffix: Option<String>,
    delete_suffix: Option<bool>,
    trim_style: Option<TrimStyle>,
    retry_count: Option<u32>,
    max_concurrent_calls: Option<usize>,
    handler_timeout: Option<Duration>,
    receive_wait: Option<Duration>,
}

impl EventBusConfigBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker connection string.
    pub fn connection_string(mut self, value: impl Into<String>) -> Self {
        self.connection_string = Some(value.into());
        self
    }

    /// Set the shared topic name.
    pub fn topic_name(mut self, value: impl Into<String>) -> Self {
        self.topic_name = Some(value.into());
        self
    }

    /// Set the subscriber application name.
    pub fn subscriber_client_app_name(mut self, value: impl Into<String>) -> Self {
        self.subscriber_client_app_name = Some(value.into());
        self
    }

    /// Set the prefix to strip. Stripping is enabled when non-empty unless
    /// overridden with [`delete_prefix`](Self::delete_prefix).
    pub fn event_name_prefix(mut self, value: impl Into<String>) -> Self {
        self.prefix = Some(value.into());
        self
    }

    /// Force prefix stripping on or off.
    #[must_use]
    pub fn delete_prefix(mut self, enabled: bool) -> Self {
        self.delete_prefix = Some(enabled);
        self
    }

    /// Set the suffix to strip. Stripping is enabled when non-empty unless
    /// overridden with [`delete_suffix`](Self::delete_suffix).
    pub fn event_name_suffix(mut self, value: impl Into<String>) -> Self {
        self.suffix = Some(value.into());
        self
    }

    /// Force suffix stripping on or off.
    #[must_use]
    pub fn delete_suffix(mut self, enabled: bool) -> Self {
        self.delete_suffix = Some(enabled);
        self
    }

    /// Set the trim style.
    #[must_use]
    pub fn trim_style(mut self, style: TrimStyle) -> Self {
        self.trim_style = Some(style);
        self
    }

    /// Set the transient-failure retry count.
    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set the in-flight handler cap.
    #[must_use]
    pub fn max_concurrent_calls(mut self, calls: usize) -> Self {
        self.max_concurrent_calls = Some(calls);
        self
    }

    /// Set the per-message dispatch timeout.
    #[must_use]
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Set the receive poll window.
    #[must_use]
    pub fn receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = Some(wait);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<EventBusConfig, EventBusError> {
        let connection_string = self.connection_string.ok_or(EventBusError::ConfigMissing {
            var: "connection_string".to_string(),
        })?;
        let subscriber_client_app_name =
            self.subscriber_client_app_name
                .ok_or(EventBusError::ConfigMissing {
                    var: "subscriber_client_app_name".to_string(),
                })?;
        if subscriber_client_app_name.trim().is_empty() {
            return Err(EventBusError::ConfigInvalid {
                var: "subscriber_client_app_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let topic_name = self
            .topic_name
            .unwrap_or_else(|| DEFAULT_TOPIC_NAME.to_string());
        if topic_name.trim().is_empty() {
            return Err(EventBusError::ConfigInvalid {
                var: "topic_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let max_concurrent_calls = self
            .max_concurrent_calls
            .unwrap_or(DEFAULT_MAX_CONCURRENT_CALLS);
        if max_concurrent_calls == 0 {
            return Err(EventBusError::ConfigInvalid {
                var: "max_concurrent_calls".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.handler_timeout == Some(Duration::ZERO) {
            return Err(EventBusError::ConfigInvalid {
                var: "handler_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let prefix = self.prefix.unwrap_or_default();
        let suffix = self
            .suffix
            .unwrap_or_else(|| DEFAULT_EVENT_NAME_SUFFIX.to_string());
        let naming = NamingRules {
            delete_prefix: self.delete_prefix.unwrap_or(!prefix.is_empty()),
            prefix,
            delete_suffix: self.delete_suffix.unwrap_or(!suffix.is_empty()),
            suffix,
            style: self.trim_style.unwrap_or_default(),
        };

        Ok(EventBusConfig {
            connection_string,
            topic_name,
            subscriber_client_app_name,
            naming,
            retry_count: self.retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
            max_concurrent_calls,
            handler_timeout: self.handler_timeout,
            receive_wait: self.receive_wait.unwrap_or(DEFAULT_RECEIVE_WAIT),
        })
    }
}
