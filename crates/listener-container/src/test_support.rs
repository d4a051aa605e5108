//! Collaborator doubles shared by the unit tests.

use crate::channel::{Channel, ChannelProvider};
use crate::error::BoxError;
use crate::message::DeliveryTag;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts every operation performed on channels sharing this instance
#[derive(Debug, Default)]
pub(crate) struct ChannelCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub acks: Mutex<Vec<DeliveryTag>>,
    pub rejects: Mutex<Vec<(DeliveryTag, bool)>>,
}

impl ChannelCounters {
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

pub(crate) struct RecordingChannel {
    transactional: bool,
    open: AtomicBool,
    fail_commit: bool,
    counters: Arc<ChannelCounters>,
}

impl RecordingChannel {
    pub fn new(transactional: bool, counters: Arc<ChannelCounters>) -> Self {
        Self {
            transactional,
            open: AtomicBool::new(true),
            fail_commit: false,
            counters,
        }
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn shared(self) -> Arc<dyn Channel> {
        Arc::new(self)
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_transactional(&self) -> bool {
        self.transactional
    }

    async fn commit(&self) -> Result<(), BoxError> {
        if self.fail_commit {
            return Err("commit refused by broker".into());
        }
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ack(&self, tag: DeliveryTag, _multiple: bool) -> Result<(), BoxError> {
        self.counters.acks.lock().unwrap().push(tag);
        Ok(())
    }

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BoxError> {
        self.counters.rejects.lock().unwrap().push((tag, requeue));
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.open.store(false, Ordering::SeqCst);
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out recording channels and counts how many were opened
pub(crate) struct RecordingProvider {
    pub counters: Arc<ChannelCounters>,
    pub fail: AtomicBool,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(ChannelCounters::default()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChannelProvider for RecordingProvider {
    async fn create_channel(&self, transactional: bool) -> Result<Arc<dyn Channel>, BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("no channel available".into());
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(RecordingChannel::new(transactional, Arc::clone(&self.counters)).shared())
    }
}
