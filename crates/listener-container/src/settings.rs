//! Externally supplied container settings.
//!
//! Settings are layered with the `config` crate: an optional file (format
//! taken from its extension) overridden by `LISTENER__`-prefixed environment
//! variables, e.g. `LISTENER__ACKNOWLEDGE_MODE=manual` or
//! `LISTENER__QUEUE_NAMES=orders,invoices`.

use crate::acknowledge::AcknowledgeMode;
use crate::config::{ContainerConfig, DEFAULT_PHASE};
use crate::error::{ConfigurationError, ListenerError};
use crate::listener::MessageListener;
use crate::message::QueueName;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "LISTENER";

/// Plain-data container settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    pub queue_names: Vec<String>,
    pub acknowledge_mode: AcknowledgeMode,
    pub expose_listener_channel: bool,
    pub channel_transacted: bool,
    pub auto_startup: bool,
    pub phase: i32,
    pub listener_id: Option<String>,
    pub default_requeue_rejected: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            queue_names: Vec::new(),
            acknowledge_mode: AcknowledgeMode::default(),
            expose_listener_channel: true,
            channel_transacted: false,
            auto_startup: true,
            phase: DEFAULT_PHASE,
            listener_id: None,
            default_requeue_rejected: true,
        }
    }
}

impl ContainerSettings {
    /// Load settings from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_environment(path, None)
    }

    /// Load settings, reading environment overrides from `environment`
    /// instead of the process environment when given
    pub fn load_with_environment(
        path: Option<&Path>,
        environment: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading listener container settings");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("queue_names")
                    .try_parsing(true)
                    .source(environment),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?
            .try_deserialize::<Self>()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings that do not depend on runtime collaborators
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.queue_names.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue_names".to_string(),
            });
        }

        self.acknowledge_mode
            .validate(self.channel_transacted, self.expose_listener_channel)
    }

    /// Build a container configuration around `listener`
    pub fn into_config(self, listener: MessageListener) -> Result<ContainerConfig, ListenerError> {
        let queues = self
            .queue_names
            .into_iter()
            .map(QueueName::new)
            .collect::<Result<Vec<_>, _>>()?;

        let mut config = ContainerConfig::new()
            .with_message_listener(listener)
            .with_acknowledge_mode(self.acknowledge_mode)
            .with_expose_listener_channel(self.expose_listener_channel)
            .with_channel_transacted(self.channel_transacted)
            .with_auto_startup(self.auto_startup)
            .with_phase(self.phase)
            .with_default_requeue_rejected(self.default_requeue_rejected);
        config.add_queue_names(queues);

        if let Some(id) = self.listener_id {
            config = config.with_listener_id(id);
        }

        Ok(config)
    }
}
