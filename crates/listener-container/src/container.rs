//! # Listener Container
//!
//! Lifecycle state machine and dispatch entry point.
//!
//! ```text
//! Created -> Initialized -> Started <-> Stopped -> ShutDown
//! ```
//!
//! `ShutDown` is reachable from every state and is terminal: a container that
//! has been shut down refuses to start again.
//!
//! The `initialized`, `active` and `running` flags live under one mutex, the
//! lifecycle monitor. The monitor is only held for flag transitions, never
//! while a hook or a listener runs, so dispatch does not contend on it.
//! Every transition wakes the tasks waiting in
//! [`ListenerContainer::wait_until_running`].

use crate::config::ContainerConfig;
use crate::channel::Channel;
use crate::error::{BoxError, ConfigurationError, ListenerError};
use crate::message::Message;
use crate::transaction::{ResourceBinder, TransactionContext};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;

/// Error type returned by lifecycle hooks
pub type HookError = BoxError;

/// Broker-specific behaviour plugged into the container lifecycle.
///
/// Every hook error is reported to callers as
/// [`ListenerError::BrokerAccess`], with the hook error as its source.
#[async_trait]
pub trait ContainerHooks: Send + Sync {
    /// Register consumers with the broker. Called once, on first start,
    /// after the configuration has been validated.
    async fn do_initialize(&self, config: &ContainerConfig) -> Result<(), HookError>;

    /// Called on every start of a container that is not running, before it
    /// is marked running. Never runs concurrently with itself.
    async fn do_start(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Called on stop, before the container stops accepting messages
    async fn do_stop(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Tear down consumers. Called at most once.
    async fn do_shutdown(&self) -> Result<(), HookError> {
        Ok(())
    }
}

/// Observable lifecycle state, derived from the monitor flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    Started,
    Stopped,
    ShutDown,
}

#[derive(Debug, Default)]
struct LifecycleFlags {
    initialized: bool,
    active: bool,
    running: bool,
    shut_down: bool,
}

impl LifecycleFlags {
    fn state(&self) -> LifecycleState {
        if self.shut_down {
            LifecycleState::ShutDown
        } else if self.running {
            LifecycleState::Started
        } else if self.active {
            LifecycleState::Stopped
        } else if self.initialized {
            LifecycleState::Initialized
        } else {
            LifecycleState::Created
        }
    }
}

/// Generic message listener container
pub struct ListenerContainer {
    config: ContainerConfig,
    hooks: Arc<dyn ContainerHooks>,
    binder: ResourceBinder,
    lifecycle: Mutex<LifecycleFlags>,
    transitions: Notify,
    initialization: tokio::sync::Mutex<()>,
}

/// Clears `running` when dropped, so a stop or shutdown leaves the container
/// not running whatever the hook did
struct RunningReset<'a> {
    container: &'a ListenerContainer,
}

impl Drop for RunningReset<'_> {
    fn drop(&mut self) {
        self.container.flags().running = false;
        self.container.transitions.notify_waiters();
    }
}

impl ListenerContainer {
    /// Create a container; nothing is validated or registered until `start`
    pub fn new(config: ContainerConfig, hooks: Arc<dyn ContainerHooks>) -> Self {
        let binder = ResourceBinder::new(
            config.is_expose_listener_channel(),
            config.is_channel_transacted(),
            config.channel_provider().cloned(),
        )
        .with_auto_ack(config.acknowledge_mode().is_auto_ack())
        .with_requeue_rejected(config.is_default_requeue_rejected());

        Self {
            config,
            hooks,
            binder,
            lifecycle: Mutex::new(LifecycleFlags::default()),
            transitions: Notify::new(),
            initialization: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        self.config.listener_id().unwrap_or("listener-container")
    }

    pub fn is_auto_startup(&self) -> bool {
        self.config.is_auto_startup()
    }

    pub fn phase(&self) -> i32 {
        self.config.phase()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Validate the configuration and register consumers, once.
    ///
    /// Concurrent callers wait for the first one; the registration hook runs
    /// exactly once over the container's lifetime.
    pub async fn initialize(&self) -> Result<(), ListenerError> {
        if self.is_initialized() {
            return Ok(());
        }

        let _guard = self.initialization.lock().await;

        let (initialized, shut_down) = {
            let flags = self.flags();
            (flags.initialized, flags.shut_down)
        };
        if shut_down {
            return Err(ListenerError::ContainerShutDown);
        }
        if initialized {
            return Ok(());
        }

        self.config.validate()?;

        self.hooks
            .do_initialize(&self.config)
            .await
            .map_err(|e| ListenerError::broker_access("initialize", e))?;

        self.flags().initialized = true;
        self.transitions.notify_waiters();

        info!(
            container = %self.name(),
            queues = ?self.config.queue_names(),
            listener = self.config.message_listener().map(|l| l.kind()).unwrap_or("none"),
            "Listener container initialized"
        );
        Ok(())
    }

    /// Start the container, initializing it first if needed.
    ///
    /// Starting a running container does nothing, also when several starts
    /// race. Starting a container that was shut down fails with
    /// [`ListenerError::ContainerShutDown`].
    pub async fn start(&self) -> Result<(), ListenerError> {
        if self.is_shut_down() {
            return Err(ListenerError::ContainerShutDown);
        }

        self.initialize().await?;

        // Concurrent starts run the start hook one at a time
        let _guard = self.initialization.lock().await;

        if self.is_running() {
            debug!(container = %self.name(), "Listener container already running");
            return Ok(());
        }

        self.hooks
            .do_start()
            .await
            .map_err(|e| ListenerError::broker_access("start", e))?;

        {
            let mut flags = self.flags();
            if flags.shut_down {
                // Shutdown raced in while the start hook ran
                return Err(ListenerError::ContainerShutDown);
            }
            flags.active = true;
            flags.running = true;
        }
        self.transitions.notify_waiters();

        info!(container = %self.name(), "Listener container started");
        Ok(())
    }

    /// Stop accepting messages. The container can be started again.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        let outcome = {
            let _reset = RunningReset { container: self };
            self.hooks.do_stop().await
        };

        info!(container = %self.name(), "Listener container stopped");
        outcome.map_err(|e| ListenerError::broker_access("stop", e))
    }

    /// Stop, then run `callback`, whatever the outcome of the stop
    pub async fn stop_with<F>(&self, callback: F) -> Result<(), ListenerError>
    where
        F: FnOnce(),
    {
        let outcome = self.stop().await;
        callback();
        outcome
    }

    /// Shut the container down permanently.
    ///
    /// The shutdown hook runs at most once; later calls return immediately.
    pub async fn shutdown(&self) -> Result<(), ListenerError> {
        {
            let mut flags = self.flags();
            if flags.shut_down {
                return Ok(());
            }
            flags.shut_down = true;
            flags.active = false;
        }
        self.transitions.notify_waiters();

        info!(container = %self.name(), "Shutting down listener container");

        let outcome = {
            let _reset = RunningReset { container: self };
            self.hooks.do_shutdown().await
        };

        if let Err(e) = &outcome {
            warn!(container = %self.name(), error = %e, "Listener container shutdown hook failed");
        }
        outcome.map_err(|e| ListenerError::broker_access("shutdown", e))
    }

    /// Advisory: the value may change as soon as this returns
    pub fn is_active(&self) -> bool {
        self.flags().active
    }

    /// Advisory: the value may change as soon as this returns
    pub fn is_running(&self) -> bool {
        self.flags().running
    }

    pub fn is_initialized(&self) -> bool {
        self.flags().initialized
    }

    pub fn state(&self) -> LifecycleState {
        self.flags().state()
    }

    /// Wait until the container is running, for at most `timeout`.
    ///
    /// Returns false on timeout or if the container is shut down meanwhile.
    pub async fn wait_until_running(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.transitions.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.state() {
                LifecycleState::Started => return true,
                LifecycleState::ShutDown => return false,
                _ => {}
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_running();
            }
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Entry point for consumer tasks: dispatch one delivered message.
    ///
    /// A message arriving while the container is not running is refused with
    /// [`ListenerError::RejectedWhileStopping`] and the listener is not
    /// called, so the caller can requeue it. Listener failures are routed
    /// through the error handler and also returned.
    pub async fn execute_listener(
        &self,
        channel: &Arc<dyn Channel>,
        message: &Message,
    ) -> Result<(), ListenerError> {
        self.execute_listener_in(channel, message, &TransactionContext::empty())
            .await
    }

    /// Like [`execute_listener`](Self::execute_listener), for callers already
    /// running inside an externally coordinated transaction
    #[instrument(
        name = "execute_listener",
        skip_all,
        fields(container = %self.name(), message_id = %message.message_id())
    )]
    pub async fn execute_listener_in(
        &self,
        channel: &Arc<dyn Channel>,
        message: &Message,
        context: &TransactionContext,
    ) -> Result<(), ListenerError> {
        if !self.is_running() {
            debug!("Rejecting message, listener container is not running");
            return Err(ListenerError::RejectedWhileStopping {
                message_id: message.message_id().to_string(),
            });
        }

        match self.invoke_listener(channel, message, context).await {
            Ok(()) => {
                debug!("Message listener completed");
                Ok(())
            }
            Err(error) => {
                self.handle_listener_error(&error);
                Err(error)
            }
        }
    }

    /// Dispatch to the configured listener inside a binding scope
    pub async fn invoke_listener(
        &self,
        channel: &Arc<dyn Channel>,
        message: &Message,
        context: &TransactionContext,
    ) -> Result<(), ListenerError> {
        let listener =
            self.config
                .message_listener()
                .ok_or_else(|| ConfigurationError::Missing {
                    key: "message_listener".to_string(),
                })?;

        if let Some(tag) = message.delivery_tag() {
            self.binder.register_delivery(context, channel, tag);
        }

        self.binder
            .run(channel, context, |channel, context| async move {
                listener.deliver(message, &channel, &context).await
            })
            .await
    }

    /// Route a dispatch failure.
    ///
    /// While active, failures go to the error handler, or are logged as
    /// warnings without one. Failures completing after shutdown began are
    /// logged at debug level only.
    pub fn handle_listener_error(&self, error: &ListenerError) {
        if !self.is_active() {
            debug!(
                container = %self.name(),
                error = %error,
                "Listener failure after container shutdown"
            );
            return;
        }

        match self.config.error_handler() {
            Some(handler) => handler.handle_error(error),
            None => warn!(
                container = %self.name(),
                error = %error,
                "Execution of message listener failed, and no error handler is set"
            ),
        }
    }

    fn is_shut_down(&self) -> bool {
        self.flags().shut_down
    }

    fn flags(&self) -> MutexGuard<'_, LifecycleFlags> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ListenerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerContainer")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
