use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::api::configuration::ConfigurationError;
use crate::api::defaults::{EMIT_BUFFER_BATCH_SIZE, EMIT_BUFFER_TIMEOUT};
use crate::api::element::{RecordCollection, StreamElement};
use crate::api::error::Result;
use crate::api::function::{BuildConfiguration, Function};
use crate::dag::EmitPrimitive;

/// Batches serialized output in front of an emit primitive.
///
/// A standard emit receives serialized records only; a buffered emit receives
/// every element, control elements included, so the downstream segment sees
/// the same stream. `call` reports whether a shutdown element went through.
pub(crate) struct EmitDriver {
    emit: EmitPrimitive,
    emit_buffer: Vec<Bytes>,
    batch_size: usize,
    timeout: Duration,
    last_write: Instant,
    shutdown: bool,
}

impl EmitDriver {
    pub fn new(emit: EmitPrimitive) -> Self {
        let (batch_size, timeout) = match &emit {
            EmitPrimitive::Standard(emit) => {
                (emit.emit_buffer_batch_size(), emit.emit_buffer_timeout())
            }
            EmitPrimitive::Buffered(_) => (EMIT_BUFFER_BATCH_SIZE, EMIT_BUFFER_TIMEOUT),
        };

        EmitDriver {
            emit,
            emit_buffer: Vec::with_capacity(batch_size),
            batch_size,
            timeout,
            last_write: Instant::now(),
            shutdown: false,
        }
    }

    pub fn name(&self) -> String {
        match &self.emit {
            EmitPrimitive::Standard(emit) => emit.get_name().to_string(),
            EmitPrimitive::Buffered(emit) => emit.get_name().to_string(),
        }
    }

    pub fn build(&mut self, configuration: &BuildConfiguration) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: format!("{}.emit_buffer_batch_size", self.name()),
                expected: "positive batch size",
            }
            .into());
        }

        self.last_write = Instant::now();
        match &mut self.emit {
            EmitPrimitive::Standard(emit) => emit.build(configuration),
            EmitPrimitive::Buffered(emit) => emit.build(configuration),
        }
    }

    pub fn call(&mut self, collection: RecordCollection) -> Result<bool> {
        for element in collection {
            if element.is_shutdown() {
                self.shutdown = true;
            }

            match &mut self.emit {
                EmitPrimitive::Standard(emit) => match &element {
                    StreamElement::Record(record) => {
                        let bytes = emit.serializer().write(record.value())?;
                        self.emit_buffer.push(bytes);
                    }
                    StreamElement::Checkpoint(checkpoint) => {
                        info!(
                            "{} reached checkpoint {}",
                            emit.get_name(),
                            checkpoint.timestamp()
                        );
                    }
                    _ => {}
                },
                EmitPrimitive::Buffered(emit) => {
                    let frame = emit.encode(&element)?;
                    self.emit_buffer.push(frame);
                }
            }

            if self.emit_buffer.len() >= self.batch_size {
                self.write()?;
            }
        }

        Ok(self.shutdown)
    }

    fn write(&mut self) -> Result<()> {
        if !self.emit_buffer.is_empty() {
            match &mut self.emit {
                EmitPrimitive::Standard(emit) => emit.write(self.emit_buffer.as_slice())?,
                EmitPrimitive::Buffered(emit) => emit.write(self.emit_buffer.as_slice())?,
            }
            self.emit_buffer.clear();
        }
        self.last_write = Instant::now();
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.write()
    }

    /// Write a partial batch older than the emit timeout.
    pub fn check_buffer_timeout(&mut self) -> Result<()> {
        if self.last_write.elapsed() > self.timeout {
            self.write()?;
        }
        match &mut self.emit {
            EmitPrimitive::Standard(_) => Ok(()),
            EmitPrimitive::Buffered(emit) => emit.check_buffer_timeout(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        match &mut self.emit {
            EmitPrimitive::Standard(emit) => emit.close(),
            EmitPrimitive::Buffered(emit) => emit.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::api::configuration::ConfigurationError;
    use crate::api::element::{RecordCollection, StreamElement};
    use crate::api::function::BuildConfiguration;
    use crate::dag::EmitPrimitive;
    use crate::functions::emit::CollectEmit;
    use crate::runtime::emit::EmitDriver;

    #[test]
    pub fn batch_and_flush_test() {
        let emit = CollectEmit::new().with_batch_size(2);
        let outputs = emit.outputs();
        let mut driver = EmitDriver::new(EmitPrimitive::Standard(Box::new(emit)));
        driver.build(&BuildConfiguration::standard()).unwrap();

        let collection = RecordCollection::from(vec![
            StreamElement::record(json!("a")),
            StreamElement::watermark(),
            StreamElement::record(json!("b")),
            StreamElement::checkpoint(),
            StreamElement::record(json!(3)),
        ]);
        assert!(!driver.call(collection).unwrap());
        // one full batch written, "3" still buffered
        assert_eq!(outputs.lock().unwrap().clone(), vec!["a", "b"]);

        let shutdown = driver
            .call(RecordCollection::singleton(StreamElement::shutdown()))
            .unwrap();
        assert!(shutdown);
        driver.flush().unwrap();
        assert_eq!(outputs.lock().unwrap().clone(), vec!["a", "b", "3"]);
    }

    #[test]
    pub fn zero_batch_size_rejected_test() {
        let emit = CollectEmit::new().with_batch_size(0);
        let mut driver = EmitDriver::new(EmitPrimitive::Standard(Box::new(emit)));

        let err = driver.build(&BuildConfiguration::standard()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    pub fn buffer_timeout_test() {
        let emit = CollectEmit::new()
            .with_batch_size(100)
            .with_timeout(Duration::from_millis(10));
        let outputs = emit.outputs();
        let mut driver = EmitDriver::new(EmitPrimitive::Standard(Box::new(emit)));
        driver.build(&BuildConfiguration::standard()).unwrap();

        driver
            .call(RecordCollection::singleton(StreamElement::record(json!("slow"))))
            .unwrap();
        driver.check_buffer_timeout().unwrap();
        assert!(outputs.lock().unwrap().is_empty());

        std::thread::sleep(Duration::from_millis(20));
        driver.check_buffer_timeout().unwrap();
        assert_eq!(outputs.lock().unwrap().clone(), vec!["slow"]);

        driver.close().unwrap();
    }
}
