//! # Listener Container
//!
//! Broker-agnostic message listener container: owns the lifecycle of a set of
//! queue consumers and dispatches each delivered message to one user-supplied
//! listener.
//!
//! This library provides:
//! - A lifecycle state machine with idempotent, race-free start and stop
//! - Dispatch to channel-aware, message-only or closure listeners
//! - Scoped binding of transactional channels around each dispatch
//! - Error routing to a pluggable error handler
//! - Layered settings loaded from files and the environment
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for configuration, dispatch and broker access
//! - [`message`] - Delivered messages and their identifiers
//! - [`acknowledge`] - Acknowledgement modes and their constraints
//! - [`channel`] - Broker channel abstraction and the channel holder
//! - [`listener`] - Listener shapes and the error handler
//! - [`transaction`] - Transaction context and the per-dispatch resource binder
//! - [`config`] - Container configuration
//! - [`settings`] - Externally supplied settings
//! - [`container`] - The container lifecycle and dispatch entry point
//!
//! Broker adapters implement [`ContainerHooks`] to register and cancel
//! consumers, and their consumer tasks call
//! [`ListenerContainer::execute_listener`] for every delivery.

pub mod acknowledge;
pub mod channel;
pub mod config;
pub mod container;
pub mod error;
pub mod listener;
pub mod message;
pub mod settings;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use acknowledge::AcknowledgeMode;
pub use channel::{Channel, ChannelHolder, ChannelProvider};
pub use config::{ContainerConfig, DEFAULT_PHASE};
pub use container::{ContainerHooks, HookError, LifecycleState, ListenerContainer};
pub use error::{BoxError, ConfigurationError, ListenerError, SerializationError, ValidationError};
pub use listener::{
    ChannelAwareMessageListener, ErrorHandler, ListenerFn, ListenerFuture, MessageHandler,
    MessageListener,
};
pub use message::{DeliveryTag, Message, MessageId, MessageProperties, QueueName, Timestamp};
pub use settings::{ContainerSettings, ENV_PREFIX};
pub use transaction::{ResourceBinder, TransactionContext};
