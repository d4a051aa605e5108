//! Acknowledgement modes and their configuration rules.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How and when the broker is told that a message was consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcknowledgeMode {
    /// The container acknowledges each delivery once the listener returns
    #[default]
    Auto,
    /// The listener acknowledges explicitly through the exposed channel
    Manual,
    /// The broker does not expect acknowledgements at all
    None,
}

impl AcknowledgeMode {
    /// Check if the broker should acknowledge on delivery (no acks expected)
    pub fn is_auto_ack(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Check if the listener is responsible for acknowledgements
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }

    /// Check if a transacted channel can be combined with this mode
    pub fn is_transaction_allowed(&self) -> bool {
        !self.is_auto_ack()
    }

    /// Validate the mode against the channel settings of a container.
    ///
    /// Both violations are fatal configuration errors.
    pub fn validate(
        &self,
        channel_transacted: bool,
        expose_listener_channel: bool,
    ) -> Result<(), ConfigurationError> {
        if channel_transacted && !self.is_transaction_allowed() {
            return Err(ConfigurationError::Conflict {
                message: "acknowledge mode 'none' is not allowed with a transacted channel"
                    .to_string(),
            });
        }

        if self.is_manual() && !expose_listener_channel {
            return Err(ConfigurationError::Conflict {
                message: "acknowledge mode 'manual' requires the listener channel to be exposed"
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for AcknowledgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcknowledgeMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "none" => Ok(Self::None),
            other => Err(ConfigurationError::Parsing {
                message: format!("unknown acknowledge mode '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
#[path = "acknowledge_tests.rs"]
mod tests;
