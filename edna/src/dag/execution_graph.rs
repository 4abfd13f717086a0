use std::collections::HashMap;
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::api::configuration::EngineOptions;
use crate::api::error::Result;
use crate::api::function::BuildConfiguration;
use crate::api::runtime::{ChannelAddress, IdAllocator, PhysicalNodeId, TaskId};
use crate::dag::physic_graph::{PhysicalGraph, PhysicalGraphNode};
use crate::dag::{DagError, EmitPrimitive, IngestPrimitive, Primitive};
use crate::io::registry::ChannelRegistry;
use crate::runtime::emit::EmitDriver;
use crate::runtime::ingest::IngestDriver;
use crate::runtime::orchestrator::{ExecutionReport, Orchestrator};
use crate::runtime::process::ChainedProcess;
use crate::runtime::task::{SingleSourceSingleTargetTask, TaskCompletion, TaskPrimitives};

/// Placement of one task, kept for logging and tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub physical_node_id: PhysicalNodeId,
    pub depth: usize,
    pub chain: Vec<String>,
}

/// Tasks materialized from a physical graph, ordered by decreasing depth.
pub struct ExecutionGraph {
    descriptors: Vec<TaskDescriptor>,
    tasks: Vec<SingleSourceSingleTargetTask>,
    completion_rx: Receiver<TaskCompletion>,
    poll_timeout: Duration,
    emit_addresses: HashMap<PhysicalNodeId, ChannelAddress>,
    ingest_addresses: HashMap<PhysicalNodeId, ChannelAddress>,
}

impl ExecutionGraph {
    pub(crate) fn build(
        physical_graph: &PhysicalGraph,
        ids: &mut IdAllocator,
        options: &EngineOptions,
    ) -> std::result::Result<Self, DagError> {
        for node in physical_graph.nodes() {
            if !node.is_complete() {
                return Err(DagError::IncompleteSegment(node.node_id().0));
            }
        }

        let registry = ChannelRegistry::new(options.channel_capacity);
        let mut emit_addresses = HashMap::new();
        let mut ingest_addresses = HashMap::new();
        for node in physical_graph.nodes() {
            for child in physical_graph.children(node.node_id()) {
                let address = ids.next_channel_address();
                emit_addresses.insert(node.node_id(), address);
                ingest_addresses.insert(child, address);
            }
        }

        let depths = ExecutionGraph::depths(physical_graph);
        let mut ordered: Vec<&PhysicalGraphNode> = physical_graph.nodes().iter().collect();
        ordered.sort_by(|a, b| {
            let depth_a = depths.get(&a.node_id()).cloned().unwrap_or_default();
            let depth_b = depths.get(&b.node_id()).cloned().unwrap_or_default();
            depth_b.cmp(&depth_a)
        });

        let (completion_tx, completion_rx) = crossbeam::channel::unbounded();
        let mut descriptors = Vec::with_capacity(ordered.len());
        let mut tasks = Vec::with_capacity(ordered.len());
        for node in ordered {
            let physical_node_id = node.node_id();
            let depth = depths.get(&physical_node_id).cloned().unwrap_or_default();
            let chain = node.stream_nodes().iter().map(|x| x.name()).collect();

            let primitives = ExecutionGraph::task_primitives(
                node,
                ingest_addresses.get(&physical_node_id).cloned(),
                emit_addresses.get(&physical_node_id).cloned(),
                &registry,
                options,
            )?;

            let task_id = ids.next_task_id();
            let descriptor = TaskDescriptor {
                task_id,
                physical_node_id,
                depth,
                chain,
            };
            debug!("task {:?}", descriptor);
            descriptors.push(descriptor);

            tasks.push(SingleSourceSingleTargetTask::new(
                task_id,
                physical_node_id,
                depth,
                primitives,
                options.task_poll_timeout,
                completion_tx.clone(),
            ));
        }

        info!(
            "execution graph built: {} tasks, {} buffered edges",
            tasks.len(),
            emit_addresses.len()
        );
        Ok(ExecutionGraph {
            descriptors,
            tasks,
            completion_rx,
            poll_timeout: options.task_poll_timeout,
            emit_addresses,
            ingest_addresses,
        })
    }

    /// Longest path from a root: 0 for roots, 1 + max parent depth otherwise.
    fn depths(physical_graph: &PhysicalGraph) -> HashMap<PhysicalNodeId, usize> {
        let mut depths: HashMap<PhysicalNodeId, usize> = HashMap::new();
        let mut stack: Vec<(PhysicalNodeId, usize)> =
            physical_graph.roots().iter().map(|x| (*x, 0)).collect();

        while let Some((node_id, depth)) = stack.pop() {
            let known = depths.get(&node_id).cloned();
            if known.map(|x| x >= depth).unwrap_or(false) {
                continue;
            }
            depths.insert(node_id, depth);
            for child in physical_graph.children(node_id) {
                stack.push((child, depth + 1));
            }
        }
        depths
    }

    fn task_primitives(
        node: &PhysicalGraphNode,
        ingest_address: Option<ChannelAddress>,
        emit_address: Option<ChannelAddress>,
        registry: &ChannelRegistry,
        options: &EngineOptions,
    ) -> std::result::Result<TaskPrimitives, DagError> {
        let stream_nodes = node.stream_nodes();
        let last = stream_nodes.len().saturating_sub(1);

        let mut ingest = None;
        let mut processes = Vec::new();
        let mut emit = None;
        for (index, stream_node) in stream_nodes.iter().enumerate() {
            let primitive = stream_node
                .take_primitive()
                .ok_or(DagError::PrimitiveNotSet(stream_node.node_id().0))?;
            match primitive {
                Primitive::Ingest(primitive) if index == 0 => ingest = Some(primitive),
                Primitive::Process(primitive) if index != 0 && index != last => {
                    processes.push(primitive)
                }
                Primitive::Emit(primitive) if index == last => emit = Some(primitive),
                primitive => {
                    return Err(DagError::InvalidGraphState(format!(
                        "{} at position {} of physical node {}",
                        primitive.name(),
                        index,
                        node.node_id()
                    )));
                }
            }
        }

        let (ingest, emit) = match (ingest, emit) {
            (Some(ingest), Some(emit)) => (ingest, emit),
            _ => return Err(DagError::IncompleteSegment(node.node_id().0)),
        };

        let ingest_configuration = match (&ingest, ingest_address) {
            (IngestPrimitive::Buffered(_), Some(address)) => {
                ExecutionGraph::buffered_configuration(address, registry, options)
            }
            (IngestPrimitive::Buffered(_), None) => {
                return Err(DagError::InvalidGraphState(format!(
                    "buffered ingest of physical node {} has no upstream",
                    node.node_id()
                )));
            }
            (IngestPrimitive::Streaming(_), _) => BuildConfiguration::standard(),
        };

        let emit_configuration = match (&emit, emit_address) {
            (EmitPrimitive::Buffered(_), Some(address)) => {
                ExecutionGraph::buffered_configuration(address, registry, options)
            }
            (EmitPrimitive::Buffered(_), None) => {
                return Err(DagError::InvalidGraphState(format!(
                    "buffered emit of physical node {} has no downstream",
                    node.node_id()
                )));
            }
            (EmitPrimitive::Standard(_), _) => BuildConfiguration::standard(),
        };

        Ok(TaskPrimitives {
            ingest: IngestDriver::new(ingest),
            process: ChainedProcess::chain(processes),
            emit: EmitDriver::new(emit),
            ingest_configuration,
            emit_configuration,
        })
    }

    fn buffered_configuration(
        address: ChannelAddress,
        registry: &ChannelRegistry,
        options: &EngineOptions,
    ) -> BuildConfiguration {
        BuildConfiguration::buffered(
            options.host.as_str(),
            address,
            options.buffer_max_size,
            options.buffer_max_timeout,
            registry.clone(),
        )
    }

    /// Tasks in start-candidate order, deepest first.
    pub fn descriptors(&self) -> &[TaskDescriptor] {
        self.descriptors.as_slice()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn emit_address(&self, physical_node_id: PhysicalNodeId) -> Option<ChannelAddress> {
        self.emit_addresses.get(&physical_node_id).cloned()
    }

    pub fn ingest_address(&self, physical_node_id: PhysicalNodeId) -> Option<ChannelAddress> {
        self.ingest_addresses.get(&physical_node_id).cloned()
    }

    /// Run every task to completion.
    pub fn execute(self) -> Result<ExecutionReport> {
        Orchestrator::new(self.tasks, self.completion_rx, self.poll_timeout).execute()
    }
}

#[cfg(test)]
mod tests {
    use crate::api::configuration::EngineOptions;
    use crate::api::runtime::{ChannelAddress, IdAllocator, PhysicalNodeId};
    use crate::dag::execution_graph::ExecutionGraph;
    use crate::dag::physic_graph::{PhysicalGraph, PhysicalGraphBuilder, PhysicalGraphNode};
    use crate::dag::stream_graph::{StreamGraph, StreamNodeRef};
    use crate::dag::DagError;
    use crate::test_utils::{
        aggregate_node, emit_node, filter_node, flatten_node, ingest_node, map_node,
    };

    fn linear_graph(nodes: Vec<StreamNodeRef>) -> StreamGraph {
        let mut graph = StreamGraph::new();
        for node in nodes {
            graph.add_node_to_head(node).unwrap();
        }
        graph
    }

    #[test]
    pub fn task_order_test() {
        let mut ids = IdAllocator::new();
        let graph = linear_graph(vec![
            ingest_node(&mut ids, &["1 2", "3"]),
            flatten_node(&mut ids),
            aggregate_node(&mut ids),
            map_node(&mut ids),
            emit_node(&mut ids).0,
        ]);
        let physical_graph = PhysicalGraphBuilder::new(&graph, &mut ids).build().unwrap();

        let execution_graph =
            ExecutionGraph::build(&physical_graph, &mut ids, &EngineOptions::default()).unwrap();
        assert_eq!(execution_graph.task_count(), 3);

        let order: Vec<(PhysicalNodeId, usize)> = execution_graph
            .descriptors()
            .iter()
            .map(|x| (x.physical_node_id, x.depth))
            .collect();
        assert_eq!(
            order,
            vec![
                (PhysicalNodeId(2), 2),
                (PhysicalNodeId(1), 1),
                (PhysicalNodeId(0), 0)
            ]
        );

        // one address per buffered edge, shared by both ends
        assert_eq!(
            execution_graph.emit_address(PhysicalNodeId(0)),
            Some(ChannelAddress(0))
        );
        assert_eq!(
            execution_graph.ingest_address(PhysicalNodeId(1)),
            Some(ChannelAddress(0))
        );
        assert_eq!(
            execution_graph.emit_address(PhysicalNodeId(1)),
            execution_graph.ingest_address(PhysicalNodeId(2))
        );
        assert_eq!(execution_graph.emit_address(PhysicalNodeId(2)), None);
    }

    #[test]
    pub fn incomplete_segment_test() {
        let mut ids = IdAllocator::new();
        let mut segment = PhysicalGraphNode::new(ids.next_physical_node_id());
        segment.add_ingest_node(ingest_node(&mut ids, &[])).unwrap();
        segment.add_process_node(map_node(&mut ids)).unwrap();

        let mut physical_graph = PhysicalGraph::new();
        physical_graph.add_physical_node(segment).unwrap();
        physical_graph.compute_roots();

        let rt = ExecutionGraph::build(&physical_graph, &mut ids, &EngineOptions::default());
        assert!(matches!(rt, Err(DagError::IncompleteSegment(0))));
    }

    #[test]
    pub fn primitive_not_set_test() {
        let mut ids = IdAllocator::new();
        let map = map_node(&mut ids);
        let graph = linear_graph(vec![
            ingest_node(&mut ids, &[]),
            map.clone(),
            emit_node(&mut ids).0,
        ]);
        let physical_graph = PhysicalGraphBuilder::new(&graph, &mut ids).build().unwrap();

        assert!(map.take_primitive().is_some());
        let rt = ExecutionGraph::build(&physical_graph, &mut ids, &EngineOptions::default());
        assert!(matches!(rt, Err(DagError::PrimitiveNotSet(id)) if id == map.node_id().0));
    }

    #[test]
    pub fn execute_filter_pipeline_test() {
        let mut ids = IdAllocator::new();
        let (emit, outputs) = emit_node(&mut ids);
        let graph = linear_graph(vec![
            ingest_node(&mut ids, &["a", "b", "c"]),
            filter_node(&mut ids),
            map_node(&mut ids),
            emit,
        ]);
        let physical_graph = PhysicalGraphBuilder::new(&graph, &mut ids).build().unwrap();
        let execution_graph =
            ExecutionGraph::build(&physical_graph, &mut ids, &EngineOptions::default()).unwrap();

        let report = execution_graph.execute().unwrap();
        assert_eq!(
            report.started_physical(),
            vec![PhysicalNodeId(1), PhysicalNodeId(0)]
        );
        assert_eq!(
            report.stopped_physical(),
            vec![PhysicalNodeId(0), PhysicalNodeId(1)]
        );
        assert!(report.completions.iter().all(|x| x.is_success()));
        assert_eq!(*outputs.lock().unwrap(), vec!["a", "b", "c"]);
    }
}
