use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tokio_util::sync::CancellationToken;

use crate::api::element::RecordCollection;
use crate::api::error::Result;
use crate::api::function::BuildConfiguration;
use crate::api::runtime::{PhysicalNodeId, TaskId};
use crate::metrics::{register_counter, Counter, Tag};
use crate::runtime::emit::EmitDriver;
use crate::runtime::executor::IngestExecutor;
use crate::runtime::ingest::IngestDriver;
use crate::runtime::process::ChainedProcess;
use crate::utils::thread::spawn;

/// Startup handshake reported by a task thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TaskStatus {
    /// Ingest built; a buffered ingest is bound and accepting producers.
    Ready,
    /// Emit built; a buffered emit is connected to its consumer.
    Built,
    Failed(String),
}

/// Final report of a task, sent once its run loop has ended.
#[derive(Debug)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub physical_node_id: PhysicalNodeId,
    pub records_in: u64,
    pub records_out: u64,
    pub result: Result<()>,
}

impl TaskCompletion {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// The ingest, process chain and emit of one physical segment, with the
/// configurations their `build` calls receive.
pub(crate) struct TaskPrimitives {
    pub ingest: IngestDriver,
    pub process: Option<ChainedProcess>,
    pub emit: EmitDriver,
    pub ingest_configuration: BuildConfiguration,
    pub emit_configuration: BuildConfiguration,
}

/// Handle of one physical segment running on its own thread.
///
/// `start` returns once the ingest is built; `build` releases the emit build
/// and, for a started task, returns once the emit is connected. The two calls
/// may come in either order, the task only enters its run loop after both.
pub(crate) struct SingleSourceSingleTargetTask {
    task_id: TaskId,
    physical_node_id: PhysicalNodeId,
    depth: usize,
    buffered: bool,
    cancel: CancellationToken,
    build_tx: Sender<()>,
    status_rx: Receiver<TaskStatus>,
    runner: Option<TaskRunner>,
    handle: Option<JoinHandle<()>>,
    build_requested: bool,
}

impl SingleSourceSingleTargetTask {
    pub fn new(
        task_id: TaskId,
        physical_node_id: PhysicalNodeId,
        depth: usize,
        primitives: TaskPrimitives,
        poll_timeout: Duration,
        completion_tx: Sender<TaskCompletion>,
    ) -> Self {
        let (build_tx, build_rx) = crossbeam::channel::bounded(1);
        let (status_tx, status_rx) = crossbeam::channel::unbounded();
        let cancel = CancellationToken::new();
        let buffered = primitives.ingest.is_buffered();

        let tags = vec![
            Tag::new("task_id", task_id),
            Tag::new("physical_node_id", physical_node_id),
        ];
        let runner = TaskRunner {
            task_id,
            physical_node_id,
            primitives: Some(primitives),
            poll_timeout,
            cancel: cancel.clone(),
            build_rx,
            status_tx,
            completion_tx,
            records_in: register_counter("Task_RecordsIn", tags.clone()),
            records_out: register_counter("Task_RecordsOut", tags),
        };

        SingleSourceSingleTargetTask {
            task_id,
            physical_node_id,
            depth,
            buffered,
            cancel,
            build_tx,
            status_rx,
            runner: Some(runner),
            handle: None,
            build_requested: false,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn physical_node_id(&self) -> PhysicalNodeId {
        self.physical_node_id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the ingest is an inter-task boundary.
    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        let runner = match self.runner.take() {
            Some(runner) => runner,
            None => return Err(anyhow!("task {} is already started", self.task_id).into()),
        };

        let thread_name = format!("Edna-Task-{}-{}", self.task_id, self.physical_node_id);
        let handle = spawn(thread_name.as_str(), move || runner.run())?;
        self.handle = Some(handle);

        self.wait_for(TaskStatus::Ready)?;
        if self.build_requested {
            self.wait_for(TaskStatus::Built)?;
        }
        info!("task {} started", self.task_id);
        Ok(())
    }

    pub fn build(&mut self) -> Result<()> {
        if self.build_requested {
            return Ok(());
        }
        self.build_tx
            .send(())
            .map_err(|_e| anyhow!("task {} is gone before build", self.task_id))?;
        self.build_requested = true;

        if self.is_started() {
            self.wait_for(TaskStatus::Built)?;
        }
        Ok(())
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_e| anyhow!("task {} panicked", self.task_id).into()),
            None => Ok(()),
        }
    }

    fn wait_for(&self, expected: TaskStatus) -> Result<()> {
        match self.status_rx.recv() {
            Ok(status) if status == expected => Ok(()),
            Ok(TaskStatus::Failed(msg)) => {
                Err(anyhow!("task {} failed before {:?}. {}", self.task_id, expected, msg).into())
            }
            Ok(status) => Err(anyhow!(
                "task {} reported {:?}, expected {:?}",
                self.task_id,
                status,
                expected
            )
            .into()),
            Err(_e) => {
                Err(anyhow!("task {} exited before {:?}", self.task_id, expected).into())
            }
        }
    }
}

impl Drop for SingleSourceSingleTargetTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            if let Err(e) = self.join() {
                error!("{}", e);
            }
        }
    }
}

struct TaskRunner {
    task_id: TaskId,
    physical_node_id: PhysicalNodeId,
    primitives: Option<TaskPrimitives>,
    poll_timeout: Duration,
    cancel: CancellationToken,
    build_rx: Receiver<()>,
    status_tx: Sender<TaskStatus>,
    completion_tx: Sender<TaskCompletion>,
    records_in: Counter,
    records_out: Counter,
}

impl TaskRunner {
    fn run(mut self) {
        let (result, opened) = match self.primitives.take() {
            Some(primitives) => self.execute(primitives),
            None => (
                Err(anyhow!("task {} has no primitives", self.task_id).into()),
                None,
            ),
        };

        // a failed task reports before closing, closing disconnects its neighbours
        match result {
            Ok(()) => {
                let result = self.close(opened);
                self.complete(result);
            }
            Err(e) => {
                self.complete(Err(e));
                if let Err(e) = self.close(opened) {
                    warn!("task {} close failed. {}", self.task_id, e);
                }
            }
        }

        // stay alive until the orchestrator stops us
        while !self.cancel.is_cancelled() {
            std::thread::sleep(self.poll_timeout);
        }
        debug!("task {} stopped", self.task_id);
    }

    fn complete(&self, result: Result<()>) {
        match &result {
            Ok(()) => info!(
                "task {} finished, {} records in, {} records out",
                self.task_id,
                self.records_in.load(),
                self.records_out.load()
            ),
            Err(e) => error!("task {} failed. {}", self.task_id, e),
        }

        let completion = TaskCompletion {
            task_id: self.task_id,
            physical_node_id: self.physical_node_id,
            records_in: self.records_in.load(),
            records_out: self.records_out.load(),
            result,
        };
        if self.completion_tx.send(completion).is_err() {
            warn!("task {} completion dropped, orchestrator is gone", self.task_id);
        }
    }

    fn close(&self, opened: Option<(IngestExecutor, EmitDriver)>) -> Result<()> {
        match opened {
            Some((executor, mut emit)) => {
                let close_ingest = executor.close(self.poll_timeout);
                let close_emit = emit.close();
                close_ingest.and(close_emit)
            }
            None => Ok(()),
        }
    }

    fn execute(
        &mut self,
        primitives: TaskPrimitives,
    ) -> (Result<()>, Option<(IngestExecutor, EmitDriver)>) {
        let TaskPrimitives {
            mut ingest,
            mut process,
            mut emit,
            ingest_configuration,
            emit_configuration,
        } = primitives;

        if let Err(e) = ingest.build(&ingest_configuration) {
            self.report(TaskStatus::Failed(e.to_string()));
            return (Err(e), None);
        }
        info!("task {} built ingest {}", self.task_id, ingest.name());

        let mut executor = match IngestExecutor::new(ingest) {
            Ok(executor) => executor,
            Err(e) => {
                self.report(TaskStatus::Failed(e.to_string()));
                return (Err(e.into()), None);
            }
        };
        self.report(TaskStatus::Ready);

        let result = if self.wait_build_signal() {
            match emit.build(&emit_configuration) {
                Ok(()) => {
                    info!("task {} built emit {}", self.task_id, emit.name());
                    self.report(TaskStatus::Built);
                    self.run_loop(&mut executor, process.as_mut(), &mut emit)
                }
                Err(e) => {
                    self.report(TaskStatus::Failed(e.to_string()));
                    Err(e)
                }
            }
        } else {
            debug!("task {} cancelled before build", self.task_id);
            Ok(())
        };

        (result, Some((executor, emit)))
    }

    fn wait_build_signal(&self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            match self.build_rx.recv_timeout(self.poll_timeout) {
                Ok(()) => return true,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    fn run_loop(
        &self,
        executor: &mut IngestExecutor,
        mut process: Option<&mut ChainedProcess>,
        emit: &mut EmitDriver,
    ) -> Result<()> {
        while !self.cancel.is_cancelled() {
            executor.submit();
            if let Some(collection) = executor.poll(self.poll_timeout)? {
                self.records_in.fetch_add(record_count(&collection));

                let collection = match process.as_mut() {
                    Some(process) => process.call(collection)?,
                    None => collection,
                };
                self.records_out.fetch_add(record_count(&collection));

                if emit.call(collection)? {
                    info!("task {} reached end of stream", self.task_id);
                    break;
                }
            }

            emit.check_buffer_timeout()?;
        }

        emit.flush()
    }

    fn report(&self, status: TaskStatus) {
        if self.status_tx.send(status).is_err() {
            debug!("task {} status dropped", self.task_id);
        }
    }
}

fn record_count(collection: &RecordCollection) -> u64 {
    collection.iter().filter(|element| element.is_record()).count() as u64
}
