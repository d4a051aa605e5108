//! Broker channel abstraction and the per-dispatch channel holder.
//!
//! The concrete broker client lives outside this crate. It plugs in through
//! the [`Channel`] and [`ChannelProvider`] traits; the container only ever
//! commits, rolls back, acknowledges and closes channels.

use crate::error::{BoxError, ListenerError};
use crate::message::DeliveryTag;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;

/// A broker channel as seen by the container and by channel-aware listeners
#[async_trait]
pub trait Channel: Send + Sync {
    /// Check if the channel can still be used
    fn is_open(&self) -> bool;

    /// Check if the channel was put in transactional mode
    fn is_transactional(&self) -> bool;

    /// Commit the current channel transaction
    async fn commit(&self) -> Result<(), BoxError>;

    /// Roll back the current channel transaction
    async fn rollback(&self) -> Result<(), BoxError>;

    /// Acknowledge one delivery, or every delivery up to `tag` when `multiple`
    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), BoxError>;

    /// Reject one delivery
    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BoxError>;

    /// Close the channel
    async fn close(&self) -> Result<(), BoxError>;
}

/// Source of fresh channels, used when the container does not expose its own
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Open a new channel, in transactional mode if requested
    async fn create_channel(&self, transactional: bool) -> Result<Arc<dyn Channel>, BoxError>;
}

// ============================================================================
// Channel Holder
// ============================================================================

/// Ownership wrapper around one channel for the duration of one dispatch.
///
/// A holder created with `release_after_completion` owns its channel and
/// closes it on [`release`](Self::release). Release happens at most once.
/// Dropping an owned holder that was never released closes the channel in
/// the background on the current tokio runtime.
pub struct ChannelHolder {
    channel: Arc<dyn Channel>,
    release_after_completion: bool,
    synchronized_with_transaction: AtomicBool,
    released: AtomicBool,
    delivery_tags: Mutex<Vec<DeliveryTag>>,
}

impl ChannelHolder {
    /// Create a holder; `release_after_completion` marks the channel as owned
    pub fn new(channel: Arc<dyn Channel>, release_after_completion: bool) -> Self {
        Self {
            channel,
            release_after_completion,
            synchronized_with_transaction: AtomicBool::new(false),
            released: AtomicBool::new(false),
            delivery_tags: Mutex::new(Vec::new()),
        }
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn is_release_after_completion(&self) -> bool {
        self.release_after_completion
    }

    pub fn set_synchronized_with_transaction(&self, synchronized: bool) {
        self.synchronized_with_transaction
            .store(synchronized, Ordering::Release);
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized_with_transaction.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Record a delivery to settle on commit or rollback
    pub fn add_delivery_tag(&self, tag: DeliveryTag) {
        self.tags().push(tag);
    }

    pub fn delivery_tags(&self) -> Vec<DeliveryTag> {
        self.tags().clone()
    }

    /// Acknowledge the recorded deliveries and commit the channel transaction.
    ///
    /// Deliveries are not acknowledged when the broker auto-acks them.
    pub async fn commit_all(&self, auto_ack: bool) -> Result<(), ListenerError> {
        let tags = std::mem::take(&mut *self.tags());

        if !auto_ack {
            for tag in tags {
                self.channel
                    .ack(tag, false)
                    .await
                    .map_err(|e| ListenerError::broker_access("ack", e))?;
            }
        }

        if self.channel.is_transactional() {
            self.channel
                .commit()
                .await
                .map_err(|e| ListenerError::broker_access("commit", e))?;
        }

        Ok(())
    }

    /// Roll back the channel transaction and reject the recorded deliveries
    pub async fn rollback_all(&self, requeue: bool) -> Result<(), ListenerError> {
        let tags = std::mem::take(&mut *self.tags());
        let transactional = self.channel.is_transactional();

        if transactional {
            self.channel
                .rollback()
                .await
                .map_err(|e| ListenerError::broker_access("rollback", e))?;
        }

        if tags.is_empty() {
            return Ok(());
        }

        for tag in tags {
            self.channel
                .reject(tag, requeue)
                .await
                .map_err(|e| ListenerError::broker_access("reject", e))?;
        }

        // Rejections only reach the broker once committed
        if transactional {
            self.channel
                .commit()
                .await
                .map_err(|e| ListenerError::broker_access("commit", e))?;
        }

        Ok(())
    }

    /// Release the holder, closing the channel if the holder owns it.
    ///
    /// Subsequent calls are no-ops.
    pub async fn release(&self) -> Result<(), ListenerError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if !self.release_after_completion {
            return Ok(());
        }

        debug!("Closing channel released by holder");
        self.channel
            .close()
            .await
            .map_err(|e| ListenerError::broker_access("close", e))
    }

    fn tags(&self) -> std::sync::MutexGuard<'_, Vec<DeliveryTag>> {
        self.delivery_tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChannelHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHolder")
            .field("release_after_completion", &self.release_after_completion)
            .field(
                "synchronized_with_transaction",
                &self.is_synchronized_with_transaction(),
            )
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl Drop for ChannelHolder {
    fn drop(&mut self) {
        if !self.release_after_completion || *self.released.get_mut() {
            return;
        }

        let channel = Arc::clone(&self.channel);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Channel holder dropped before release, closing channel in background");
                handle.spawn(async move {
                    if let Err(e) = channel.close().await {
                        warn!(error = %e, "Failed to close abandoned channel");
                    }
                });
            }
            Err(_) => {
                warn!("Channel holder dropped outside a tokio runtime, channel left open");
            }
        }
    }
}
