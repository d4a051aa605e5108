//! Common test utilities for listener-container integration tests
//!
//! This module provides:
//! - An in-memory broker channel and channel provider that count every call
//! - Lifecycle hooks that record consumer registration
//! - An error handler that collects routed failures
//! - Helper functions for building messages and containers

use async_trait::async_trait;
use bytes::Bytes;
use listener_container::{
    BoxError, Channel, ChannelProvider, ContainerConfig, ContainerHooks, DeliveryTag, ErrorHandler,
    HookError, ListenerError, Message, MessageHandler, MessageListener, QueueName,
    TransactionContext,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

/// Install a test subscriber once; `RUST_LOG` controls the output
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Broker Ledger
// ============================================================================

/// Shared record of every channel operation against the mock broker
#[derive(Debug, Default)]
pub struct BrokerLedger {
    opened: AtomicUsize,
    closed: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    acks: Mutex<Vec<DeliveryTag>>,
    rejects: Mutex<Vec<(DeliveryTag, bool)>>,
}

#[allow(dead_code)]
impl BrokerLedger {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn acks(&self) -> Vec<DeliveryTag> {
        self.acks.lock().unwrap().clone()
    }

    pub fn rejects(&self) -> Vec<(DeliveryTag, bool)> {
        self.rejects.lock().unwrap().clone()
    }
}

// ============================================================================
// Mock Broker Channel
// ============================================================================

/// In-memory channel recording its operations in a [`BrokerLedger`]
pub struct MockBrokerChannel {
    transactional: bool,
    open: AtomicBool,
    ledger: Arc<BrokerLedger>,
}

#[allow(dead_code)]
impl MockBrokerChannel {
    pub fn new(transactional: bool, ledger: Arc<BrokerLedger>) -> Self {
        Self {
            transactional,
            open: AtomicBool::new(true),
            ledger,
        }
    }

    /// A consumer channel with its own ledger
    pub fn consumer(transactional: bool) -> (Arc<dyn Channel>, Arc<BrokerLedger>) {
        let ledger = Arc::new(BrokerLedger::default());
        let channel: Arc<dyn Channel> =
            Arc::new(Self::new(transactional, Arc::clone(&ledger)));
        (channel, ledger)
    }
}

#[async_trait]
impl Channel for MockBrokerChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_transactional(&self) -> bool {
        self.transactional
    }

    async fn commit(&self) -> Result<(), BoxError> {
        self.ledger.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        self.ledger.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ack(&self, tag: DeliveryTag, _multiple: bool) -> Result<(), BoxError> {
        self.ledger.acks.lock().unwrap().push(tag);
        Ok(())
    }

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BoxError> {
        self.ledger.rejects.lock().unwrap().push((tag, requeue));
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err("channel already closed".into());
        }
        self.ledger.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens mock channels on demand, all sharing one ledger
#[derive(Default)]
pub struct MockChannelProvider {
    pub ledger: Arc<BrokerLedger>,
}

#[async_trait]
impl ChannelProvider for MockChannelProvider {
    async fn create_channel(&self, transactional: bool) -> Result<Arc<dyn Channel>, BoxError> {
        self.ledger.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBrokerChannel::new(
            transactional,
            Arc::clone(&self.ledger),
        )))
    }
}

// ============================================================================
// Mock Lifecycle Hooks
// ============================================================================

/// Hooks recording how often consumers were registered and torn down
#[derive(Default)]
pub struct MockHooks {
    registrations: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    shutdowns: AtomicUsize,
    registration_delay: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl MockHooks {
    pub fn with_registration_delay(delay: Duration) -> Self {
        let hooks = Self::default();
        *hooks.registration_delay.lock().unwrap() = Some(delay);
        hooks
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerHooks for MockHooks {
    async fn do_initialize(&self, _config: &ContainerConfig) -> Result<(), HookError> {
        let delay = *self.registration_delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn do_start(&self) -> Result<(), HookError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn do_stop(&self) -> Result<(), HookError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn do_shutdown(&self) -> Result<(), HookError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Collecting Error Handler
// ============================================================================

/// Error handler keeping the text of every routed failure
#[derive(Default)]
pub struct CollectingErrorHandler {
    errors: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl CollectingErrorHandler {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl ErrorHandler for CollectingErrorHandler {
    fn handle_error(&self, error: &ListenerError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

// ============================================================================
// Order Listener
// ============================================================================

/// Message-only listener that refuses "bad-payload" and records what it saw
#[derive(Default)]
pub struct OrderListener {
    seen: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl OrderListener {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageHandler for OrderListener {
    async fn on_message(
        &self,
        message: &Message,
        _context: &TransactionContext,
    ) -> Result<(), BoxError> {
        let body = message.body_as_str()?.to_string();
        self.seen.lock().unwrap().push(body.clone());

        if body == "bad-payload" {
            return Err(format!("cannot parse order '{body}'").into());
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[allow(dead_code)]
pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

/// A delivered text message as a consumer task would hand it over
#[allow(dead_code)]
pub fn delivered(body: &str, tag: u64) -> Message {
    Message::new(Bytes::from(body.to_string())).with_delivery(
        DeliveryTag::new(tag),
        queue("orders"),
        false,
    )
}

/// Container configuration for the "orders" queue around a shared listener
#[allow(dead_code)]
pub fn orders_config(listener: Arc<OrderListener>) -> ContainerConfig {
    ContainerConfig::new()
        .with_queue(queue("orders"))
        .with_message_listener(MessageListener::MessageOnly(listener))
}
