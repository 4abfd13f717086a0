use std::time::Duration;

use crate::channel::{Receiver, RecvTimeoutError, TryRecvError};
use crate::metrics::{Counter, Gauge};

#[derive(Clone)]
pub struct ChannelReceiver<T> {
    name: String,
    receiver: Receiver<T>,
    size: Gauge,
    drain_counter: Counter,
}

impl<T> ChannelReceiver<T> {
    pub fn new(name: &str, receiver: Receiver<T>, size: Gauge, drain_counter: Counter) -> Self {
        ChannelReceiver {
            name: name.to_string(),
            receiver,
            size,
            drain_counter,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn size(&self) -> i64 {
        self.size.load()
    }

    pub fn drained(&self) -> u64 {
        self.drain_counter.load()
    }

    #[inline]
    fn on_success(&self) {
        self.size.fetch_sub(1 as i64);
        self.drain_counter.fetch_add(1 as u64);
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.receiver.try_recv().map(|event| {
            self.on_success();
            event
        })
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout).map(|event| {
            self.on_success();
            event
        })
    }
}

impl<T> std::fmt::Debug for ChannelReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelReceiver")
            .field("name", &self.name)
            .field("size", &self.size.load())
            .finish()
    }
}
