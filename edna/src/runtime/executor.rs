use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::api::element::RecordCollection;
use crate::api::error::Result;
use crate::runtime::ingest::IngestDriver;
use crate::utils::thread::async_runtime_single_worker;

type Fetch = (IngestDriver, Result<RecordCollection>);

/// Runs blocking ingest fetches on a single background worker so the task
/// loop can wait for a fetch with a bound and keep servicing its output.
///
/// The ingest is moved into the worker for the duration of a fetch and moved
/// back once it completes; at most one fetch is in flight.
pub(crate) struct IngestExecutor {
    runtime: Runtime,
    ingest: Option<IngestDriver>,
    pending: Option<JoinHandle<Fetch>>,
}

impl IngestExecutor {
    pub fn new(ingest: IngestDriver) -> std::io::Result<Self> {
        let runtime = async_runtime_single_worker("Ingest")?;
        Ok(IngestExecutor {
            runtime,
            ingest: Some(ingest),
            pending: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a fetch unless one is already in flight.
    pub fn submit(&mut self) {
        if self.is_pending() {
            return;
        }
        if let Some(mut ingest) = self.ingest.take() {
            let handle = self.runtime.spawn_blocking(move || {
                let result = ingest.fetch();
                (ingest, result)
            });
            self.pending = Some(handle);
        }
    }

    /// Wait up to `timeout` for the in-flight fetch.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<RecordCollection>> {
        let handle = match self.pending.as_mut() {
            Some(handle) => handle,
            None => return Ok(None),
        };

        let rt = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, handle).await });
        match rt {
            Ok(Ok((ingest, result))) => {
                self.pending = None;
                self.ingest = Some(ingest);
                result.map(Some)
            }
            Ok(Err(e)) => {
                self.pending = None;
                Err(anyhow!("ingest fetch aborted. {}", e).into())
            }
            Err(_elapsed) => Ok(None),
        }
    }

    /// Close the ingest on the worker, waiting at most `timeout` for an
    /// in-flight fetch and for the close itself.
    pub fn close(mut self, timeout: Duration) -> Result<()> {
        if self.is_pending() {
            if let Err(e) = self.poll(timeout) {
                warn!("in-flight fetch failed during close. {}", e);
            }
        }

        let rt = match self.ingest.take() {
            Some(mut ingest) => {
                let handle = self.runtime.spawn_blocking(move || ingest.close());
                match self
                    .runtime
                    .block_on(async { tokio::time::timeout(timeout, handle).await })
                {
                    Ok(Ok(rt)) => rt,
                    Ok(Err(e)) => Err(anyhow!("ingest close aborted. {}", e).into()),
                    Err(_elapsed) => {
                        warn!("ingest close did not finish within {:?}", timeout);
                        Ok(())
                    }
                }
            }
            None => {
                warn!("ingest is still fetching, closed without it");
                Ok(())
            }
        };

        self.runtime.shutdown_background();
        rt
    }
}
