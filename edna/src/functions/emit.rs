use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::api::defaults::{EMIT_BUFFER_BATCH_SIZE, EMIT_BUFFER_TIMEOUT};
use crate::api::error::Result;
use crate::api::function::{Emit, Function};

/// Prints every record on its own line.
#[derive(Default)]
pub struct StdoutEmit;

impl StdoutEmit {
    pub fn new() -> Self {
        StdoutEmit
    }
}

impl Function for StdoutEmit {
    fn get_name(&self) -> &str {
        "StdoutEmit"
    }
}

impl Emit for StdoutEmit {
    fn emit_buffer_batch_size(&self) -> usize {
        1
    }

    fn write(&mut self, emit_buffer: &[Bytes]) -> Result<()> {
        for record in emit_buffer {
            println!("{}", String::from_utf8_lossy(record.as_ref()));
        }
        Ok(())
    }
}

/// Logs the running record total every `n` records and once more on close.
pub struct RecordCounterEmit {
    n: u64,
    count: u64,
}

impl RecordCounterEmit {
    pub fn new(n: u64) -> Self {
        RecordCounterEmit { n: n.max(1), count: 0 }
    }
}

impl Function for RecordCounterEmit {
    fn get_name(&self) -> &str {
        "RecordCounterEmit"
    }
}

impl Emit for RecordCounterEmit {
    fn write(&mut self, emit_buffer: &[Bytes]) -> Result<()> {
        for _ in emit_buffer {
            self.count += 1;
            if self.count % self.n == 0 {
                info!("{} records emitted", self.count);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!("emit closed, {} records in total", self.count);
        Ok(())
    }
}

/// Collects records in memory as text.
pub struct CollectEmit {
    batch_size: usize,
    timeout: Duration,
    outputs: Arc<Mutex<Vec<String>>>,
}

impl CollectEmit {
    pub fn new() -> Self {
        CollectEmit {
            batch_size: EMIT_BUFFER_BATCH_SIZE,
            timeout: EMIT_BUFFER_TIMEOUT,
            outputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shared handle to the collected records, readable after the job ends.
    pub fn outputs(&self) -> Arc<Mutex<Vec<String>>> {
        self.outputs.clone()
    }
}

impl Default for CollectEmit {
    fn default() -> Self {
        CollectEmit::new()
    }
}

impl Function for CollectEmit {
    fn get_name(&self) -> &str {
        "CollectEmit"
    }
}

impl Emit for CollectEmit {
    fn emit_buffer_batch_size(&self) -> usize {
        self.batch_size
    }

    fn emit_buffer_timeout(&self) -> Duration {
        self.timeout
    }

    fn write(&mut self, emit_buffer: &[Bytes]) -> Result<()> {
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|e| anyhow!("collect buffer poisoned. {}", e))?;
        outputs.extend(
            emit_buffer
                .iter()
                .map(|x| String::from_utf8_lossy(x.as_ref()).to_string()),
        );
        Ok(())
    }
}
