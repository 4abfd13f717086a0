use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::api::error::Result;
use crate::api::runtime::{PhysicalNodeId, TaskId};
use crate::runtime::task::{SingleSourceSingleTargetTask, TaskCompletion};

/// Outcome of a finished job.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Task ids in the order they were started, deepest segment first.
    pub started: Vec<TaskId>,
    /// Task ids in the order they were stopped, the reverse of `started`.
    pub stopped: Vec<TaskId>,
    pub completions: Vec<TaskCompletion>,
    pub physical_nodes: HashMap<TaskId, PhysicalNodeId>,
}

impl ExecutionReport {
    pub fn started_physical(&self) -> Vec<PhysicalNodeId> {
        self.to_physical(&self.started)
    }

    pub fn stopped_physical(&self) -> Vec<PhysicalNodeId> {
        self.to_physical(&self.stopped)
    }

    pub fn completion_of(&self, physical_node_id: PhysicalNodeId) -> Option<&TaskCompletion> {
        self.completions
            .iter()
            .find(|c| c.physical_node_id == physical_node_id)
    }

    fn to_physical(&self, task_ids: &[TaskId]) -> Vec<PhysicalNodeId> {
        task_ids
            .iter()
            .filter_map(|task_id| self.physical_nodes.get(task_id).cloned())
            .collect()
    }
}

/// Starts the tasks of a job, waits for every completion and tears the job
/// down in reverse start order.
///
/// Start order: buffered tasks deepest first, then every emit is built, then
/// the source tasks. The first failed completion stops the whole job.
pub(crate) struct Orchestrator {
    tasks: Vec<SingleSourceSingleTargetTask>,
    completion_rx: Receiver<TaskCompletion>,
    poll_timeout: Duration,
    started: Vec<usize>,
}

impl Orchestrator {
    pub fn new(
        tasks: Vec<SingleSourceSingleTargetTask>,
        completion_rx: Receiver<TaskCompletion>,
        poll_timeout: Duration,
    ) -> Self {
        Orchestrator {
            tasks,
            completion_rx,
            poll_timeout,
            started: Vec::new(),
        }
    }

    pub fn execute(mut self) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        for task in &self.tasks {
            report
                .physical_nodes
                .insert(task.task_id(), task.physical_node_id());
        }

        let result = self
            .launch()
            .and_then(|_| self.await_completions(&mut report.completions));

        report.started = self.started_ids();
        report.stopped = self.shutdown();

        result.map(|_| report)
    }

    fn launch(&mut self) -> Result<()> {
        let mut order: Vec<usize> = (0..self.tasks.len()).collect();
        order.sort_by(|a, b| self.tasks[*b].depth().cmp(&self.tasks[*a].depth()));

        let (buffered, sources): (Vec<usize>, Vec<usize>) = order
            .into_iter()
            .partition(|index| self.tasks[*index].is_buffered());

        for index in buffered {
            self.start(index)?;
        }

        for task in self.tasks.iter_mut() {
            task.build()?;
        }

        for index in sources {
            self.start(index)?;
        }

        info!("all {} tasks started", self.tasks.len());
        Ok(())
    }

    fn start(&mut self, index: usize) -> Result<()> {
        let task = &mut self.tasks[index];
        debug!(
            "start task {}, physical node {}, depth {}",
            task.task_id(),
            task.physical_node_id(),
            task.depth()
        );
        // a task is stopped on teardown once its thread exists, even if the
        // startup handshake failed
        let rt = task.start();
        if task.is_started() {
            self.started.push(index);
        }
        rt
    }

    fn await_completions(&mut self, completions: &mut Vec<TaskCompletion>) -> Result<()> {
        let mut pending: HashSet<TaskId> = self.tasks.iter().map(|t| t.task_id()).collect();

        while !pending.is_empty() {
            match self.completion_rx.recv_timeout(self.poll_timeout) {
                Ok(completion) => {
                    pending.remove(&completion.task_id);

                    let failure = completion.result.as_ref().err().map(|e| {
                        anyhow!(
                            "task {} (physical node {}) failed. {}",
                            completion.task_id,
                            completion.physical_node_id,
                            e
                        )
                    });
                    completions.push(completion);

                    if let Some(e) = failure {
                        error!("{}, tear down the job", e);
                        return Err(e.into());
                    }
                    debug!("{} tasks pending", pending.len());
                }
                Err(RecvTimeoutError::Timeout) => crate::metrics::compute(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!(
                        "completion channel closed with {} tasks pending",
                        pending.len()
                    )
                    .into());
                }
            }
        }

        Ok(())
    }

    fn started_ids(&self) -> Vec<TaskId> {
        self.started
            .iter()
            .map(|index| self.tasks[*index].task_id())
            .collect()
    }

    fn shutdown(&mut self) -> Vec<TaskId> {
        let mut stopped = Vec::with_capacity(self.started.len());
        for index in self.started.iter().rev() {
            let task = &self.tasks[*index];
            task.stop();
            stopped.push(task.task_id());
        }

        for index in self.started.iter().rev() {
            let task = &mut self.tasks[*index];
            if let Err(e) = task.join() {
                error!("{}", e);
            }
        }

        crate::metrics::compute();
        info!("job stopped");
        stopped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use crate::api::error::Result;
    use crate::api::function::{BuildConfiguration, Function, Ingest};
    use crate::api::runtime::{PhysicalNodeId, TaskId};
    use crate::dag::{EmitPrimitive, IngestPrimitive};
    use crate::functions::emit::CollectEmit;
    use crate::functions::ingest::SimulatedIngest;
    use crate::runtime::emit::EmitDriver;
    use crate::runtime::ingest::IngestDriver;
    use crate::runtime::orchestrator::Orchestrator;
    use crate::runtime::task::{SingleSourceSingleTargetTask, TaskPrimitives};

    struct BrokenIngest;

    impl Function for BrokenIngest {
        fn get_name(&self) -> &str {
            "BrokenIngest"
        }
    }

    impl Ingest for BrokenIngest {
        fn next(&mut self) -> Result<Bytes> {
            Err(anyhow!("upstream unavailable").into())
        }
    }

    fn task(
        id: u32,
        ingest: Box<dyn Ingest>,
        completion_tx: &crossbeam::channel::Sender<crate::runtime::TaskCompletion>,
    ) -> SingleSourceSingleTargetTask {
        SingleSourceSingleTargetTask::new(
            TaskId(id),
            PhysicalNodeId(id),
            0,
            TaskPrimitives {
                ingest: IngestDriver::new(IngestPrimitive::Streaming(ingest)),
                process: None,
                emit: EmitDriver::new(EmitPrimitive::Standard(Box::new(CollectEmit::new()))),
                ingest_configuration: BuildConfiguration::standard(),
                emit_configuration: BuildConfiguration::standard(),
            },
            Duration::from_millis(20),
            completion_tx.clone(),
        )
    }

    #[test]
    pub fn independent_tasks_test() {
        let (completion_tx, completion_rx) = crossbeam::channel::unbounded();
        let tasks = vec![
            task(0, Box::new(SimulatedIngest::from_list(vec!["a", "b"])), &completion_tx),
            task(1, Box::new(SimulatedIngest::from_list(vec!["c"])), &completion_tx),
        ];
        drop(completion_tx);

        let report = Orchestrator::new(tasks, completion_rx, Duration::from_millis(20))
            .execute()
            .unwrap();
        assert_eq!(report.started, vec![TaskId(0), TaskId(1)]);
        assert_eq!(report.stopped, vec![TaskId(1), TaskId(0)]);
        assert_eq!(report.completions.len(), 2);
        assert_eq!(
            report.completion_of(PhysicalNodeId(0)).map(|c| c.records_in),
            Some(2)
        );
    }

    #[test]
    pub fn failed_task_tears_down_job_test() {
        let (completion_tx, completion_rx) = crossbeam::channel::unbounded();
        let endless = SimulatedIngest::from_fn(|index| Some(index.to_string()));
        let tasks = vec![
            task(0, Box::new(endless), &completion_tx),
            task(1, Box::new(BrokenIngest), &completion_tx),
        ];
        drop(completion_tx);

        let err = Orchestrator::new(tasks, completion_rx, Duration::from_millis(20))
            .execute()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("task 1"), "{}", msg);
        assert!(msg.contains("upstream unavailable"), "{}", msg);
    }
}
