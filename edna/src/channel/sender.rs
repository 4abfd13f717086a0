use std::time::Duration;

use crate::channel::{SendError, SendTimeoutError, Sender, TrySendError};
use crate::metrics::{Counter, Gauge};

#[derive(Clone)]
pub struct ChannelSender<T> {
    name: String,
    sender: Sender<T>,
    cap: usize,

    size: Gauge,
    counter: Counter,
}

impl<T> ChannelSender<T> {
    pub fn new(name: &str, sender: Sender<T>, cap: usize, size: Gauge, counter: Counter) -> Self {
        ChannelSender {
            name: name.to_string(),
            sender,
            cap,
            size,
            counter,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn size(&self) -> i64 {
        self.size.load()
    }

    #[inline]
    fn on_success(&self) {
        self.size.fetch_add(1 as i64);
        self.counter.fetch_add(1 as u64);
    }

    /// Blocks while the channel is full.
    pub fn send(&self, event: T) -> Result<(), SendError<T>> {
        self.sender.send(event).map(|r| {
            self.on_success();
            r
        })
    }

    pub fn send_timeout(&self, event: T, timeout: Duration) -> Result<(), SendTimeoutError<T>> {
        self.sender.send_timeout(event, timeout).map(|r| {
            self.on_success();
            r
        })
    }

    pub fn try_send(&self, event: T) -> Result<(), TrySendError<T>> {
        self.sender.try_send(event).map(|r| {
            self.on_success();
            r
        })
    }
}

impl<T> std::fmt::Debug for ChannelSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSender")
            .field("name", &self.name)
            .field("cap", &self.cap)
            .field("size", &self.size.load())
            .finish()
    }
}
