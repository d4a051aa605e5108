//! Container configuration.
//!
//! A [`ContainerConfig`] is assembled before the container is created and is
//! immutable once handed to [`ListenerContainer`](crate::ListenerContainer).
//! Validation happens when the container starts, not when setters are called.

use crate::acknowledge::AcknowledgeMode;
use crate::channel::ChannelProvider;
use crate::error::ConfigurationError;
use crate::listener::{ErrorHandler, MessageListener};
use crate::message::QueueName;
use std::sync::Arc;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Default startup phase; containers start late and stop early
pub const DEFAULT_PHASE: i32 = i32::MAX;

/// Configuration of a listener container
#[derive(Clone)]
pub struct ContainerConfig {
    queue_names: Vec<QueueName>,
    message_listener: Option<MessageListener>,
    expose_listener_channel: bool,
    acknowledge_mode: AcknowledgeMode,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    auto_startup: bool,
    phase: i32,
    channel_transacted: bool,
    channel_provider: Option<Arc<dyn ChannelProvider>>,
    listener_id: Option<String>,
    default_requeue_rejected: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            queue_names: Vec::new(),
            message_listener: None,
            expose_listener_channel: true,
            acknowledge_mode: AcknowledgeMode::default(),
            error_handler: None,
            auto_startup: true,
            phase: DEFAULT_PHASE,
            channel_transacted: false,
            channel_provider: None,
            listener_id: None,
            default_requeue_rejected: true,
        }
    }
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    /// Add a queue to consume from
    pub fn with_queue(mut self, queue: QueueName) -> Self {
        self.add_queue_names([queue]);
        self
    }

    pub fn with_message_listener(mut self, listener: MessageListener) -> Self {
        self.message_listener = Some(listener);
        self
    }

    pub fn with_expose_listener_channel(mut self, expose: bool) -> Self {
        self.expose_listener_channel = expose;
        self
    }

    pub fn with_acknowledge_mode(mut self, mode: AcknowledgeMode) -> Self {
        self.acknowledge_mode = mode;
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_auto_startup(mut self, auto_startup: bool) -> Self {
        self.auto_startup = auto_startup;
        self
    }

    pub fn with_phase(mut self, phase: i32) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_channel_transacted(mut self, transacted: bool) -> Self {
        self.channel_transacted = transacted;
        self
    }

    /// Provider for separate channels, required when the listener channel is not exposed
    pub fn with_channel_provider(mut self, provider: Arc<dyn ChannelProvider>) -> Self {
        self.channel_provider = Some(provider);
        self
    }

    pub fn with_listener_id(mut self, id: String) -> Self {
        self.listener_id = Some(id);
        self
    }

    pub fn with_default_requeue_rejected(mut self, requeue: bool) -> Self {
        self.default_requeue_rejected = requeue;
        self
    }

    // ------------------------------------------------------------------------
    // Queue set
    // ------------------------------------------------------------------------

    /// Add queues, ignoring names already present
    pub fn add_queue_names(&mut self, queues: impl IntoIterator<Item = QueueName>) {
        for queue in queues {
            if !self.queue_names.contains(&queue) {
                self.queue_names.push(queue);
            }
        }
    }

    /// Remove queues; returns true if any queue was removed
    pub fn remove_queue_names<'a>(
        &mut self,
        queues: impl IntoIterator<Item = &'a QueueName>,
    ) -> bool {
        let before = self.queue_names.len();
        for queue in queues {
            self.queue_names.retain(|existing| existing != queue);
        }
        self.queue_names.len() != before
    }

    /// Replace the whole queue set
    pub fn set_queue_names(&mut self, queues: impl IntoIterator<Item = QueueName>) {
        self.queue_names.clear();
        self.add_queue_names(queues);
    }

    pub fn queue_names(&self) -> &[QueueName] {
        &self.queue_names
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn message_listener(&self) -> Option<&MessageListener> {
        self.message_listener.as_ref()
    }

    pub fn is_expose_listener_channel(&self) -> bool {
        self.expose_listener_channel
    }

    pub fn acknowledge_mode(&self) -> AcknowledgeMode {
        self.acknowledge_mode
    }

    pub fn error_handler(&self) -> Option<&Arc<dyn ErrorHandler>> {
        self.error_handler.as_ref()
    }

    pub fn is_auto_startup(&self) -> bool {
        self.auto_startup
    }

    pub fn phase(&self) -> i32 {
        self.phase
    }

    pub fn is_channel_transacted(&self) -> bool {
        self.channel_transacted
    }

    pub fn channel_provider(&self) -> Option<&Arc<dyn ChannelProvider>> {
        self.channel_provider.as_ref()
    }

    pub fn listener_id(&self) -> Option<&str> {
        self.listener_id.as_deref()
    }

    pub fn is_default_requeue_rejected(&self) -> bool {
        self.default_requeue_rejected
    }

    /// Validate the configuration before the container registers consumers
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.queue_names.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue_names".to_string(),
            });
        }

        if self.message_listener.is_none() {
            return Err(ConfigurationError::Missing {
                key: "message_listener".to_string(),
            });
        }

        self.acknowledge_mode
            .validate(self.channel_transacted, self.expose_listener_channel)?;

        if !self.expose_listener_channel && self.channel_provider.is_none() {
            return Err(ConfigurationError::Missing {
                key: "channel_provider".to_string(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for ContainerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerConfig")
            .field("queue_names", &self.queue_names)
            .field("message_listener", &self.message_listener)
            .field("expose_listener_channel", &self.expose_listener_channel)
            .field("acknowledge_mode", &self.acknowledge_mode)
            .field("error_handler", &self.error_handler.is_some())
            .field("auto_startup", &self.auto_startup)
            .field("phase", &self.phase)
            .field("channel_transacted", &self.channel_transacted)
            .field("channel_provider", &self.channel_provider.is_some())
            .field("listener_id", &self.listener_id)
            .field("default_requeue_rejected", &self.default_requeue_rejected)
            .finish()
    }
}
