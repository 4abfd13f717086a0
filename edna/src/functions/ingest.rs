use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use crate::api::error::Result;
use crate::api::function::{Function, Ingest};

type Generator = Box<dyn FnMut(usize) -> Option<String> + Send>;

enum Source {
    List(VecDeque<String>),
    Generator(Generator),
}

/// A source replaying a fixed list, or calling a generator with the record
/// index until it returns `None`.
pub struct SimulatedIngest {
    source: Source,
    index: usize,
    peeked: Option<String>,
    delay: Option<Duration>,
    watermark_interval: Option<Duration>,
    checkpoint_interval: Option<Duration>,
    shutdown_after: Option<Duration>,
}

impl SimulatedIngest {
    fn new(source: Source) -> Self {
        SimulatedIngest {
            source,
            index: 0,
            peeked: None,
            delay: None,
            watermark_interval: None,
            checkpoint_interval: None,
            shutdown_after: None,
        }
    }

    pub fn from_list<S: ToString>(records: Vec<S>) -> Self {
        let records = records.iter().map(|x| x.to_string()).collect();
        SimulatedIngest::new(Source::List(records))
    }

    pub fn from_fn<F>(generator: F) -> Self
    where
        F: FnMut(usize) -> Option<String> + Send + 'static,
    {
        SimulatedIngest::new(Source::Generator(Box::new(generator)))
    }

    /// Sleep before every record.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_watermark_interval(mut self, interval: Duration) -> Self {
        self.watermark_interval = Some(interval);
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = Some(interval);
        self
    }

    pub fn with_shutdown_after(mut self, after: Duration) -> Self {
        self.shutdown_after = Some(after);
        self
    }

    fn peek(&mut self) -> Option<&String> {
        if self.peeked.is_none() {
            self.peeked = match &mut self.source {
                Source::List(records) => records.pop_front(),
                Source::Generator(generator) => generator(self.index),
            };
        }
        self.peeked.as_ref()
    }
}

impl Function for SimulatedIngest {
    fn get_name(&self) -> &str {
        "SimulatedIngest"
    }
}

impl Ingest for SimulatedIngest {
    fn has_next(&mut self) -> bool {
        self.peek().is_some()
    }

    fn next(&mut self) -> Result<Bytes> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        self.peek();
        match self.peeked.take() {
            Some(record) => {
                self.index += 1;
                Ok(Bytes::from(record))
            }
            None => Err(anyhow!("SimulatedIngest exhausted after {} records", self.index).into()),
        }
    }

    fn watermark_interval(&self) -> Option<Duration> {
        self.watermark_interval
    }

    fn checkpoint_interval(&self) -> Option<Duration> {
        self.checkpoint_interval
    }

    fn shutdown_after(&self) -> Option<Duration> {
        self.shutdown_after
    }
}
