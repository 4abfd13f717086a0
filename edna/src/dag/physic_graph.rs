use std::collections::{HashMap, HashSet};

use daggy::{Dag, NodeIndex};

use crate::api::runtime::{IdAllocator, NodeId, PhysicalNodeId};
use crate::dag::stream_graph::{StreamGraph, StreamGraphNode, StreamNodeRef};
use crate::dag::utils::JsonDag;
use crate::dag::{DagError, NodeType};
use crate::io::buffered_emit::BufferedEmit;
use crate::io::buffered_ingest::BufferedIngest;

/// One pipeline segment: a linear chain of an ingest, zero or more processes
/// and an emit, executed by a single task.
///
/// The segment is chainable until an emit (real or buffered) is inserted.
#[derive(Debug)]
pub struct PhysicalGraphNode {
    node_id: PhysicalNodeId,
    internal_stream_graph: StreamGraph,
    chainable: bool,
}

impl PhysicalGraphNode {
    pub fn new(node_id: PhysicalNodeId) -> Self {
        PhysicalGraphNode {
            node_id,
            internal_stream_graph: StreamGraph::new(),
            chainable: true,
        }
    }

    pub fn node_id(&self) -> PhysicalNodeId {
        self.node_id
    }

    pub fn is_chainable(&self) -> bool {
        self.chainable
    }

    pub fn internal_stream_graph(&self) -> &StreamGraph {
        &self.internal_stream_graph
    }

    fn addable(&self) -> Result<(), DagError> {
        if self.chainable {
            Ok(())
        } else {
            Err(DagError::NodeNotChainable(self.node_id.0))
        }
    }

    pub fn add_ingest_node(&mut self, node: StreamNodeRef) -> Result<(), DagError> {
        self.addable()?;
        if !self.internal_stream_graph.is_empty() {
            return Err(DagError::InvalidGraphState(format!(
                "physical node {} already has an ingest",
                self.node_id
            )));
        }
        self.internal_stream_graph.add_node(node).map(|_| ())
    }

    pub fn add_process_node(&mut self, node: StreamNodeRef) -> Result<(), DagError> {
        self.addable()?;
        self.internal_stream_graph.add_node_to_head(node).map(|_| ())
    }

    pub fn add_emit_node(&mut self, node: StreamNodeRef) -> Result<(), DagError> {
        self.addable()?;
        self.internal_stream_graph.add_node_to_head(node)?;
        self.chainable = false;
        Ok(())
    }

    /// The chain in execution order.
    pub fn stream_nodes(&self) -> &[StreamNodeRef] {
        self.internal_stream_graph.nodes()
    }

    pub fn ingest_node(&self) -> Option<&StreamNodeRef> {
        self.stream_nodes().first().filter(|node| node.is_ingest())
    }

    pub fn emit_node(&self) -> Option<&StreamNodeRef> {
        self.stream_nodes().last().filter(|node| node.is_emit())
    }

    pub fn process_nodes(&self) -> Vec<&StreamNodeRef> {
        self.stream_nodes()
            .iter()
            .filter(|node| node.is_process())
            .collect()
    }

    pub fn tail_node_id(&self) -> Option<NodeId> {
        self.stream_nodes().last().map(|node| node.node_id())
    }

    /// Starts with an ingest and ends with an emit.
    pub fn is_complete(&self) -> bool {
        self.ingest_node().is_some() && self.emit_node().is_some()
    }

    pub fn ends_with_buffered_emit(&self) -> bool {
        self.emit_node()
            .map(|node| node.is_buffered())
            .unwrap_or(false)
    }

    pub fn starts_with_buffered_ingest(&self) -> bool {
        self.ingest_node()
            .map(|node| node.is_buffered())
            .unwrap_or(false)
    }

    fn detail(&self) -> PhysicalNodeDetail {
        PhysicalNodeDetail {
            physical_id: self.node_id.0,
            chainable: self.chainable,
            chain: self
                .stream_nodes()
                .iter()
                .map(|node| ChainEntry {
                    node_id: node.node_id().0,
                    name: node.name(),
                    node_type: node.node_type(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct ChainEntry {
    pub node_id: u32,
    pub name: String,
    pub node_type: NodeType,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PhysicalNodeDetail {
    pub physical_id: u32,
    pub chainable: bool,
    pub chain: Vec<ChainEntry>,
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub(crate) enum PhysicalEdge {
    Buffered,
}

/// Segments and the buffered edges between them.
#[derive(Debug, Default)]
pub struct PhysicalGraph {
    node_list: Vec<PhysicalGraphNode>,
    node_map: HashMap<PhysicalNodeId, Vec<Option<PhysicalNodeId>>>,
    /// stream node id -> hosting physical node id
    stream_nodes_map: HashMap<NodeId, PhysicalNodeId>,
    root_list: Vec<PhysicalNodeId>,
}

impl PhysicalGraph {
    pub fn new() -> Self {
        PhysicalGraph::default()
    }

    pub fn len(&self) -> usize {
        self.node_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_list.is_empty()
    }

    pub fn nodes(&self) -> &[PhysicalGraphNode] {
        self.node_list.as_slice()
    }

    pub fn add_physical_node(&mut self, node: PhysicalGraphNode) -> Result<(), DagError> {
        if self.node_map.contains_key(&node.node_id()) {
            return Err(DagError::InvalidGraphState(format!(
                "physical node {} already exists",
                node.node_id()
            )));
        }

        for stream_node in node.stream_nodes() {
            self.map_stream_node(stream_node.node_id(), node.node_id())?;
        }
        self.node_map.insert(node.node_id(), Vec::new());
        self.node_list.push(node);
        Ok(())
    }

    pub fn map_stream_node(
        &mut self,
        stream_node_id: NodeId,
        physical_node_id: PhysicalNodeId,
    ) -> Result<(), DagError> {
        if self.stream_nodes_map.contains_key(&stream_node_id) {
            return Err(DagError::NodeAlreadyMapped(stream_node_id.0));
        }
        self.stream_nodes_map
            .insert(stream_node_id, physical_node_id);
        Ok(())
    }

    pub fn stream_node_count(&self) -> usize {
        self.stream_nodes_map.len()
    }

    pub fn physical_node_of(&self, stream_node_id: NodeId) -> Result<PhysicalNodeId, DagError> {
        self.stream_nodes_map
            .get(&stream_node_id)
            .map(|x| *x)
            .ok_or_else(|| DagError::NodeNotFound(format!("stream node {}", stream_node_id)))
    }

    fn position(&self, node_id: PhysicalNodeId) -> Result<usize, DagError> {
        self.node_list
            .iter()
            .position(|node| node.node_id() == node_id)
            .ok_or(DagError::PhysicalGraphNodeDoesNotExist(node_id.0))
    }

    pub fn node(&self, node_id: PhysicalNodeId) -> Result<&PhysicalGraphNode, DagError> {
        let position = self.position(node_id)?;
        Ok(&self.node_list[position])
    }

    pub fn node_mut(&mut self, node_id: PhysicalNodeId) -> Result<&mut PhysicalGraphNode, DagError> {
        let position = self.position(node_id)?;
        Ok(&mut self.node_list[position])
    }

    pub fn add_edge(&mut self, source: PhysicalNodeId, target: PhysicalNodeId) -> Result<(), DagError> {
        self.check_edge(source, target)?;
        self.node_map.entry(source).or_default().push(Some(target));
        Ok(())
    }

    /// Reserve an outgoing slot whose target is not known yet.
    pub fn add_placeholder_edge(&mut self, source: PhysicalNodeId) -> Result<usize, DagError> {
        self.position(source)?;
        let edges = self.node_map.entry(source).or_default();
        edges.push(None);
        Ok(edges.len() - 1)
    }

    pub fn update_placeholder_edge(
        &mut self,
        source: PhysicalNodeId,
        target: PhysicalNodeId,
        slot: usize,
    ) -> Result<(), DagError> {
        self.check_edge(source, target)?;
        let edges = self.node_map.entry(source).or_default();
        match edges.get_mut(slot) {
            Some(edge) if edge.is_none() => {
                *edge = Some(target);
                Ok(())
            }
            _ => Err(DagError::InvalidGraphState(format!(
                "physical node {} has no open slot {}",
                source, slot
            ))),
        }
    }

    fn check_edge(&self, source: PhysicalNodeId, target: PhysicalNodeId) -> Result<(), DagError> {
        self.position(source)?;
        self.position(target)?;
        if self.children(source).contains(&target) {
            return Err(DagError::DuplicateEdge {
                source: source.0,
                target: target.0,
            });
        }
        Ok(())
    }

    pub fn children(&self, node_id: PhysicalNodeId) -> Vec<PhysicalNodeId> {
        self.node_map
            .get(&node_id)
            .map(|edges| edges.iter().filter_map(|x| *x).collect())
            .unwrap_or_default()
    }

    pub fn parents(&self, node_id: PhysicalNodeId) -> Vec<PhysicalNodeId> {
        self.node_list
            .iter()
            .map(|node| node.node_id())
            .filter(|source| self.children(*source).contains(&node_id))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.node_map
            .values()
            .map(|edges| edges.iter().filter(|x| x.is_some()).count())
            .sum()
    }

    /// Segments without an incoming edge, in insertion order.
    pub fn compute_roots(&mut self) {
        let targets: HashSet<PhysicalNodeId> = self
            .node_map
            .values()
            .flat_map(|edges| edges.iter().filter_map(|x| *x))
            .collect();
        self.root_list = self
            .node_list
            .iter()
            .map(|node| node.node_id())
            .filter(|node_id| !targets.contains(node_id))
            .collect();
    }

    pub fn roots(&self) -> &[PhysicalNodeId] {
        self.root_list.as_slice()
    }

    pub(crate) fn to_dag(&self) -> Result<Dag<PhysicalNodeDetail, PhysicalEdge>, DagError> {
        let mut dag = Dag::new();
        let mut node_indies: HashMap<PhysicalNodeId, NodeIndex> = HashMap::new();
        for node in &self.node_list {
            let node_index = dag.add_node(node.detail());
            node_indies.insert(node.node_id(), node_index);
        }

        for node in &self.node_list {
            let source = node_indies[&node.node_id()];
            for target in self.children(node.node_id()) {
                let target = node_indies[&target];
                dag.add_edge(source, target, PhysicalEdge::Buffered)
                    .map_err(|e| DagError::InvalidGraphState(format!("{:?}", e)))?;
            }
        }

        Ok(dag)
    }

    /// JSON rendering of the segments and their edges.
    pub fn explain(&self) -> Result<String, DagError> {
        let dag = self.to_dag()?;
        let json_dag = JsonDag::from(&dag);
        serde_json::to_string_pretty(&json_dag)
            .map_err(|e| DagError::InvalidGraphState(e.to_string()))
    }
}

/// Compiles a flattened `StreamGraph` into segments.
///
/// Maps fuse into the open segment of their parent. Filter, flatten and
/// aggregate close their segment with a buffered emit, so the next operator
/// starts a new segment behind a buffered ingest.
pub struct PhysicalGraphBuilder<'a> {
    stream_graph: &'a StreamGraph,
    ids: &'a mut IdAllocator,
    physical_graph: PhysicalGraph,
}

impl<'a> PhysicalGraphBuilder<'a> {
    pub fn new(stream_graph: &'a StreamGraph, ids: &'a mut IdAllocator) -> Self {
        PhysicalGraphBuilder {
            stream_graph,
            ids,
            physical_graph: PhysicalGraph::new(),
        }
    }

    pub fn build(mut self) -> Result<PhysicalGraph, DagError> {
        self.check_linear()?;

        let roots = self.stream_graph.roots().to_vec();
        for root in roots {
            self.visit(root, None)?;
        }

        self.physical_graph.compute_roots();
        info!(
            "physical graph built: {} segments, {} buffered edges",
            self.physical_graph.len(),
            self.physical_graph.edge_count()
        );
        Ok(self.physical_graph)
    }

    /// Segments are linear, so are the graphs they are cut from.
    fn check_linear(&self) -> Result<(), DagError> {
        let mut parent_counts: HashMap<usize, usize> = HashMap::new();
        for node_index in 0..self.stream_graph.len() {
            let children = self.stream_graph.children(node_index);
            if children.len() > 1 {
                let node = self.stream_graph.node(node_index)?;
                return Err(DagError::BranchingNotSupported(node.node_id().0));
            }
            for child in children {
                *parent_counts.entry(child).or_default() += 1;
            }
        }

        for (node_index, count) in parent_counts {
            if count > 1 {
                let node = self.stream_graph.node(node_index)?;
                return Err(DagError::BranchingNotSupported(node.node_id().0));
            }
        }
        Ok(())
    }

    fn visit(&mut self, node_index: usize, parent: Option<NodeId>) -> Result<(), DagError> {
        let node = self.stream_graph.node(node_index)?.clone();

        match (node.node_type(), parent) {
            (NodeType::Ingest, _) => self.insert_ingest(node.clone())?,
            (NodeType::Process(process_type), Some(parent)) => {
                if process_type.is_one_to_one() {
                    self.insert_map(node.clone(), parent)?
                } else {
                    self.insert_segment_closing(node.clone(), parent)?
                }
            }
            (NodeType::Emit, Some(parent)) => self.insert_emit(node.clone(), parent)?,
            (node_type, None) => {
                return Err(DagError::InvalidGraphState(format!(
                    "{} node {} has no parent",
                    node_type,
                    node.node_id()
                )))
            }
        }

        for child in self.stream_graph.children(node_index) {
            self.visit(child, Some(node.node_id()))?;
        }
        Ok(())
    }

    fn insert_ingest(&mut self, node: StreamNodeRef) -> Result<(), DagError> {
        let mut physical_node = PhysicalGraphNode::new(self.ids.next_physical_node_id());
        physical_node.add_ingest_node(node)?;
        self.physical_graph.add_physical_node(physical_node)
    }

    fn insert_map(&mut self, node: StreamNodeRef, parent: NodeId) -> Result<(), DagError> {
        match self.chainable_host(parent)? {
            Some(host) => self.append(host, node, false).map(|_| ()),
            None => self.open_segment(parent, node, false).map(|_| ()),
        }
    }

    fn insert_segment_closing(&mut self, node: StreamNodeRef, parent: NodeId) -> Result<(), DagError> {
        let host = match self.chainable_host(parent)? {
            Some(host) => self.append(host, node, false)?,
            None => self.open_segment(parent, node, false)?,
        };
        self.close_with_buffered_emit(host)
    }

    fn insert_emit(&mut self, node: StreamNodeRef, parent: NodeId) -> Result<(), DagError> {
        match self.chainable_host(parent)? {
            Some(host) => self.append(host, node, true).map(|_| ()),
            None => self.open_segment(parent, node, true).map(|_| ()),
        }
    }

    /// The segment hosting `parent`, if it can take more operators.
    fn chainable_host(&self, parent: NodeId) -> Result<Option<PhysicalNodeId>, DagError> {
        let host = self.physical_graph.physical_node_of(parent)?;
        let physical_node = self.physical_graph.node(host)?;
        if physical_node.is_chainable() && physical_node.tail_node_id() == Some(parent) {
            Ok(Some(host))
        } else {
            Ok(None)
        }
    }

    fn append(
        &mut self,
        host: PhysicalNodeId,
        node: StreamNodeRef,
        emit: bool,
    ) -> Result<PhysicalNodeId, DagError> {
        let node_id = node.node_id();
        let physical_node = self.physical_graph.node_mut(host)?;
        if emit {
            physical_node.add_emit_node(node)?;
        } else {
            physical_node.add_process_node(node)?;
        }
        self.physical_graph.map_stream_node(node_id, host)?;
        Ok(host)
    }

    /// Start a segment behind a buffered ingest fed by the closed segment
    /// hosting `parent`.
    fn open_segment(
        &mut self,
        parent: NodeId,
        node: StreamNodeRef,
        emit: bool,
    ) -> Result<PhysicalNodeId, DagError> {
        let upstream = self.physical_graph.physical_node_of(parent)?;
        let upstream_node = self.physical_graph.node(upstream)?;
        if !upstream_node.ends_with_buffered_emit()
            || !self.physical_graph.children(upstream).is_empty()
        {
            return Err(DagError::BranchingNotSupported(upstream.0));
        }

        let physical_id = self.ids.next_physical_node_id();
        let buffered_ingest = StreamGraphNode::buffered_ingest(
            self.ids.next_node_id(),
            BufferedIngest::new(upstream),
        );

        let mut physical_node = PhysicalGraphNode::new(physical_id);
        physical_node.add_ingest_node(buffered_ingest)?;
        if emit {
            physical_node.add_emit_node(node)?;
        } else {
            physical_node.add_process_node(node)?;
        }
        self.physical_graph.add_physical_node(physical_node)?;
        self.physical_graph.add_edge(upstream, physical_id)?;

        debug!("segment {} opened behind segment {}", physical_id, upstream);
        Ok(physical_id)
    }

    fn close_with_buffered_emit(&mut self, host: PhysicalNodeId) -> Result<(), DagError> {
        let buffered_emit =
            StreamGraphNode::buffered_emit(self.ids.next_node_id(), BufferedEmit::new());
        self.append(host, buffered_emit, true).map(|_| ())
    }
}
