//! Message listener shapes and the error handler interface.
//!
//! A container dispatches to exactly one [`MessageListener`]. The three
//! supported call shapes are fixed when the listener is configured, so the
//! dispatch path is a plain `match` with no runtime type inspection.
//!
//! # Examples
//!
//! ```rust
//! use listener_container::{MessageListener, Message, TransactionContext};
//!
//! let listener = MessageListener::from_fn(|message: Message, _context: TransactionContext| async move {
//!     println!("received {}", message.message_id());
//!     Ok(())
//! });
//! assert!(!listener.is_channel_aware());
//! ```

use crate::channel::Channel;
use crate::error::{BoxError, ListenerError};
use crate::message::Message;
use crate::transaction::TransactionContext;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;

/// Listener that works with the live channel, e.g. to acknowledge manually
#[async_trait]
pub trait ChannelAwareMessageListener: Send + Sync {
    async fn on_message(&self, message: &Message, channel: &Arc<dyn Channel>)
        -> Result<(), BoxError>;
}

/// Listener that only needs the message.
///
/// When the container binds a transactional channel for the dispatch, it is
/// reachable through `context`; pass the context on to any code that should
/// take part in the same transaction.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: &Message, context: &TransactionContext)
        -> Result<(), BoxError>;
}

/// Boxed future returned by function listeners
pub type ListenerFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

/// Function listener signature
pub type ListenerFn = Arc<dyn Fn(Message, TransactionContext) -> ListenerFuture + Send + Sync>;

/// The listener a container dispatches to
#[derive(Clone)]
pub enum MessageListener {
    /// Receives the message and the channel it arrived on
    ChannelAware(Arc<dyn ChannelAwareMessageListener>),
    /// Receives the message and the dispatch's transaction context
    MessageOnly(Arc<dyn MessageHandler>),
    /// A plain async function with the same inputs as `MessageOnly`
    Function(ListenerFn),
}

impl MessageListener {
    pub fn channel_aware<L>(listener: L) -> Self
    where
        L: ChannelAwareMessageListener + 'static,
    {
        Self::ChannelAware(Arc::new(listener))
    }

    pub fn message_only<L>(listener: L) -> Self
    where
        L: MessageHandler + 'static,
    {
        Self::MessageOnly(Arc::new(listener))
    }

    /// Wrap an async function as a listener
    pub fn from_fn<F, Fut>(function: F) -> Self
    where
        F: Fn(Message, TransactionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let function: ListenerFn =
            Arc::new(move |message: Message, context: TransactionContext| -> ListenerFuture {
                Box::pin(function(message, context))
            });
        Self::Function(function)
    }

    pub fn is_channel_aware(&self) -> bool {
        matches!(self, Self::ChannelAware(_))
    }

    /// Short name of the call shape, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChannelAware(_) => "channel-aware",
            Self::MessageOnly(_) => "message-only",
            Self::Function(_) => "function",
        }
    }

    /// Invoke the listener once.
    ///
    /// Any failure comes back as `ListenerExecutionFailed`, never wrapped twice.
    pub async fn deliver(
        &self,
        message: &Message,
        channel: &Arc<dyn Channel>,
        context: &TransactionContext,
    ) -> Result<(), ListenerError> {
        let outcome = match self {
            Self::ChannelAware(listener) => listener.on_message(message, channel).await,
            Self::MessageOnly(listener) => listener.on_message(message, context).await,
            Self::Function(function) => function(message.clone(), context.clone()).await,
        };

        outcome.map_err(ListenerError::wrap_listener_failure)
    }
}

impl std::fmt::Debug for MessageListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MessageListener").field(&self.kind()).finish()
    }
}

// ============================================================================
// Error Handler
// ============================================================================

/// Receives listener failures while the container is active
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: &ListenerError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ListenerError) + Send + Sync,
{
    fn handle_error(&self, error: &ListenerError) {
        self(error)
    }
}
