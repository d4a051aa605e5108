//! Transactional channel binding around a single dispatch.
//!
//! Instead of a process-wide registry, the bound channel travels with the
//! dispatch as an explicit [`TransactionContext`]. Code called by a listener
//! receives the context and reuses the in-flight channel rather than opening
//! a second one. A context is created per dispatch, so concurrent dispatches
//! never observe each other's channel.

use crate::channel::{Channel, ChannelHolder, ChannelProvider};
use crate::error::{ConfigurationError, ListenerError};
use crate::message::DeliveryTag;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;

// ============================================================================
// Transaction Context
// ============================================================================

/// The transactional channel bound to one dispatch, if any
#[derive(Clone, Default)]
pub struct TransactionContext {
    holder: Option<Arc<ChannelHolder>>,
}

impl TransactionContext {
    /// A context with nothing bound
    pub fn empty() -> Self {
        Self::default()
    }

    /// A context carrying an already-bound holder.
    ///
    /// Used by callers running under an externally coordinated transaction;
    /// the container passes such a context through without rebinding.
    pub fn bound(holder: Arc<ChannelHolder>) -> Self {
        Self {
            holder: Some(holder),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.holder.is_some()
    }

    pub fn holder(&self) -> Option<&Arc<ChannelHolder>> {
        self.holder.as_ref()
    }

    /// The bound channel, for listeners that publish or acknowledge within
    /// the same transaction
    pub fn channel(&self) -> Option<&Arc<dyn Channel>> {
        self.holder.as_ref().map(|holder| holder.channel())
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("holder", &self.holder)
            .finish()
    }
}

// ============================================================================
// Resource Binder
// ============================================================================

/// Binds a transactional channel into the dispatch context and guarantees
/// its cleanup.
pub struct ResourceBinder {
    expose_listener_channel: bool,
    channel_transacted: bool,
    channel_provider: Option<Arc<dyn ChannelProvider>>,
    auto_ack: bool,
    requeue_rejected: bool,
}

/// Everything the cleanup step needs to know about one opened scope
struct BindingScope {
    channel: Arc<dyn Channel>,
    context: TransactionContext,
    owned_holder: Option<Arc<ChannelHolder>>,
    bound_here: bool,
}

impl ResourceBinder {
    pub fn new(
        expose_listener_channel: bool,
        channel_transacted: bool,
        channel_provider: Option<Arc<dyn ChannelProvider>>,
    ) -> Self {
        Self {
            expose_listener_channel,
            channel_transacted,
            channel_provider,
            auto_ack: false,
            requeue_rejected: true,
        }
    }

    /// Skip acknowledging deliveries recorded on a separate channel, for
    /// brokers that auto-ack on delivery
    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    /// Whether deliveries recorded on a rolled back channel are requeued
    pub fn with_requeue_rejected(mut self, requeue: bool) -> Self {
        self.requeue_rejected = requeue;
        self
    }

    /// Record a delivery on the externally bound holder so that the external
    /// commit acknowledges it.
    ///
    /// Only deliveries made on the bound channel itself are recorded, and
    /// nothing is recorded when the broker auto-acks. Returns whether the tag
    /// was recorded.
    pub fn register_delivery(
        &self,
        context: &TransactionContext,
        channel: &Arc<dyn Channel>,
        tag: DeliveryTag,
    ) -> bool {
        if self.auto_ack {
            return false;
        }

        match context.holder() {
            Some(holder) if Arc::ptr_eq(holder.channel(), channel) => {
                holder.add_delivery_tag(tag);
                debug!(delivery_tag = %tag, "Registered delivery with external transaction");
                true
            }
            _ => false,
        }
    }

    /// Run `body` inside a binding scope.
    ///
    /// `body` receives the channel to hand to the listener and the context
    /// carrying the bound holder. Cleanup runs after `body` on every outcome;
    /// a failure from `body` always takes precedence over a cleanup failure.
    pub async fn run<F, Fut>(
        &self,
        channel: &Arc<dyn Channel>,
        outer: &TransactionContext,
        body: F,
    ) -> Result<(), ListenerError>
    where
        F: FnOnce(Arc<dyn Channel>, TransactionContext) -> Fut,
        Fut: Future<Output = Result<(), ListenerError>>,
    {
        let scope = self.open_scope(channel, outer).await?;
        let result = body(Arc::clone(&scope.channel), scope.context.clone()).await;
        self.close_scope(scope, result).await
    }

    async fn open_scope(
        &self,
        channel: &Arc<dyn Channel>,
        outer: &TransactionContext,
    ) -> Result<BindingScope, ListenerError> {
        // An externally coordinated transaction keeps its own binding
        let may_bind = self.channel_transacted && !outer.is_bound();

        if !self.expose_listener_channel {
            // Work done inside an external transaction goes to its channel
            if let Some(external) = outer.channel() {
                debug!("Reusing externally bound channel for dispatch");
                return Ok(BindingScope {
                    channel: Arc::clone(external),
                    context: outer.clone(),
                    owned_holder: None,
                    bound_here: false,
                });
            }

            let provider =
                self.channel_provider
                    .as_ref()
                    .ok_or_else(|| ConfigurationError::Missing {
                        key: "channel_provider".to_string(),
                    })?;
            let separate = provider
                .create_channel(self.channel_transacted)
                .await
                .map_err(|e| ListenerError::broker_access("create_channel", e))?;
            let holder = Arc::new(ChannelHolder::new(separate, true));

            let context = if may_bind {
                holder.set_synchronized_with_transaction(true);
                debug!("Bound separate transactional channel for dispatch");
                TransactionContext::bound(Arc::clone(&holder))
            } else {
                outer.clone()
            };

            return Ok(BindingScope {
                channel: Arc::clone(holder.channel()),
                context,
                owned_holder: Some(holder),
                bound_here: may_bind,
            });
        }

        if may_bind {
            let local = Arc::new(ChannelHolder::new(Arc::clone(channel), false));
            local.set_synchronized_with_transaction(true);
            debug!("Bound listener channel for dispatch");
            return Ok(BindingScope {
                channel: Arc::clone(channel),
                context: TransactionContext::bound(local),
                owned_holder: None,
                bound_here: true,
            });
        }

        Ok(BindingScope {
            channel: Arc::clone(channel),
            context: outer.clone(),
            owned_holder: None,
            bound_here: false,
        })
    }

    async fn close_scope(
        &self,
        scope: BindingScope,
        result: Result<(), ListenerError>,
    ) -> Result<(), ListenerError> {
        let BindingScope {
            context,
            owned_holder,
            bound_here,
            ..
        } = scope;

        if bound_here {
            if let Some(holder) = context.holder() {
                holder.set_synchronized_with_transaction(false);
            }
            debug!("Unbound transactional channel after dispatch");
        }
        drop(context);

        let Some(holder) = owned_holder else {
            // The container's own channel is settled by the consumer loop
            return result;
        };

        let mut outcome = result;

        // Nobody else sees the separate channel, so its transaction ends here
        if self.channel_transacted {
            let settled = if outcome.is_ok() {
                holder.commit_all(self.auto_ack).await
            } else {
                holder.rollback_all(self.requeue_rejected).await
            };
            outcome = merge_cleanup(outcome, settled, "settle separate channel");
        }

        let released = holder.release().await;
        merge_cleanup(outcome, released, "release separate channel")
    }
}

fn merge_cleanup(
    outcome: Result<(), ListenerError>,
    cleanup: Result<(), ListenerError>,
    step: &str,
) -> Result<(), ListenerError> {
    match (outcome, cleanup) {
        (Ok(()), cleanup) => cleanup,
        (Err(original), Ok(())) => Err(original),
        (Err(original), Err(cleanup_error)) => {
            warn!(
                step,
                error = %cleanup_error,
                "Cleanup failed after listener failure"
            );
            Err(original)
        }
    }
}
