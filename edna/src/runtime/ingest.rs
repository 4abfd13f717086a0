use std::time::{Duration, Instant};

use crate::api::element::{RecordCollection, StreamElement};
use crate::api::error::Result;
use crate::api::function::{BuildConfiguration, Function, Ingest};
use crate::dag::IngestPrimitive;
use crate::io::buffered_ingest::BufferedIngest;
use crate::utils::date_time::timestamp_str;

struct Interval {
    period: Duration,
    last: Instant,
}

impl Interval {
    fn new(period: Duration) -> Self {
        Interval {
            period,
            last: Instant::now(),
        }
    }

    fn elapsed(&mut self) -> bool {
        if self.last.elapsed() >= self.period {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

/// Drives a user `Ingest`: one record per fetch, plus the watermark,
/// checkpoint and shutdown markers its timers call for.
pub(crate) struct StreamingIngest {
    ingest: Box<dyn Ingest>,
    watermark: Option<Interval>,
    checkpoint: Option<Interval>,
    shutdown_at: Option<Instant>,
    shutdown_sent: bool,
}

impl StreamingIngest {
    pub fn new(ingest: Box<dyn Ingest>) -> Self {
        StreamingIngest {
            ingest,
            watermark: None,
            checkpoint: None,
            shutdown_at: None,
            shutdown_sent: false,
        }
    }

    pub fn build(&mut self, configuration: &BuildConfiguration) -> Result<()> {
        self.ingest.build(configuration)?;

        self.watermark = self.ingest.watermark_interval().map(Interval::new);
        self.checkpoint = self.ingest.checkpoint_interval().map(Interval::new);
        self.shutdown_at = self
            .ingest
            .shutdown_after()
            .map(|after| Instant::now() + after);
        Ok(())
    }

    fn shutdown(&mut self, collection: &mut RecordCollection) {
        if !self.shutdown_sent {
            self.shutdown_sent = true;
            collection.push(StreamElement::shutdown());
        }
    }

    pub fn fetch(&mut self) -> Result<RecordCollection> {
        let mut collection = RecordCollection::new();
        if self.shutdown_sent {
            return Ok(collection);
        }

        if !self.ingest.has_next() {
            self.shutdown(&mut collection);
            return Ok(collection);
        }

        let raw = self.ingest.next()?;
        let value = self.ingest.serializer().read(raw.as_ref())?;
        collection.push(StreamElement::record(value));

        if self.watermark.as_mut().map(|x| x.elapsed()).unwrap_or(false) {
            let watermark = StreamElement::watermark();
            debug!(
                "{} generate watermark {}",
                self.ingest.get_name(),
                timestamp_str(watermark.event_time())
            );
            collection.push(watermark);
        }
        if self.checkpoint.as_mut().map(|x| x.elapsed()).unwrap_or(false) {
            collection.push(StreamElement::checkpoint());
        }
        if let Some(shutdown_at) = self.shutdown_at {
            if Instant::now() >= shutdown_at {
                info!("{} reached its shutdown deadline", self.ingest.get_name());
                self.shutdown(&mut collection);
            }
        }

        Ok(collection)
    }

    pub fn close(&mut self) -> Result<()> {
        self.ingest.close()
    }
}

/// Ingest side of a task, either a user source or an inter-task boundary.
pub(crate) enum IngestDriver {
    Streaming(StreamingIngest),
    Buffered(BufferedIngest),
}

impl IngestDriver {
    pub fn new(primitive: IngestPrimitive) -> Self {
        match primitive {
            IngestPrimitive::Streaming(ingest) => {
                IngestDriver::Streaming(StreamingIngest::new(ingest))
            }
            IngestPrimitive::Buffered(ingest) => IngestDriver::Buffered(ingest),
        }
    }

    pub fn is_buffered(&self) -> bool {
        match self {
            IngestDriver::Streaming(_) => false,
            IngestDriver::Buffered(_) => true,
        }
    }

    pub fn name(&self) -> String {
        match self {
            IngestDriver::Streaming(ingest) => ingest.ingest.get_name().to_string(),
            IngestDriver::Buffered(ingest) => ingest.get_name().to_string(),
        }
    }

    pub fn build(&mut self, configuration: &BuildConfiguration) -> Result<()> {
        match self {
            IngestDriver::Streaming(ingest) => ingest.build(configuration),
            IngestDriver::Buffered(ingest) => ingest.build(configuration),
        }
    }

    pub fn fetch(&mut self) -> Result<RecordCollection> {
        match self {
            IngestDriver::Streaming(ingest) => ingest.fetch(),
            IngestDriver::Buffered(ingest) => ingest.fetch(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            IngestDriver::Streaming(ingest) => ingest.close(),
            IngestDriver::Buffered(ingest) => ingest.close(),
        }
    }
}
