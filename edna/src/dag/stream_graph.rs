use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::api::function::{Emit, Ingest, Process};
use crate::api::runtime::NodeId;
use crate::dag::{DagError, EmitPrimitive, IngestPrimitive, NodeType, Primitive, ProcessType};
use crate::io::buffered_emit::BufferedEmit;
use crate::io::buffered_ingest::BufferedIngest;
use crate::utils::name::create_name_suffix;

/// Position of a node inside one `StreamGraph`.
pub type NodeIndex = usize;

pub type StreamNodeRef = Rc<StreamGraphNode>;

/// A typed node wrapping one primitive.
///
/// Nodes are shared by reference between the graphs that contain them; the
/// primitive is moved out exactly once, when the task that runs it is built.
pub struct StreamGraphNode {
    node_id: NodeId,
    name: RefCell<String>,
    node_type: NodeType,
    primitive: RefCell<Option<Primitive>>,
}

impl StreamGraphNode {
    fn create(
        node_id: NodeId,
        node_type: NodeType,
        name: Option<&str>,
        primitive: Primitive,
    ) -> StreamNodeRef {
        let name = match name {
            Some(name) => name.to_string(),
            None => create_name_suffix(10),
        };
        Rc::new(StreamGraphNode {
            node_id,
            name: RefCell::new(name),
            node_type,
            primitive: RefCell::new(Some(primitive)),
        })
    }

    pub fn ingest(node_id: NodeId, name: Option<&str>, ingest: Box<dyn Ingest>) -> StreamNodeRef {
        let primitive = Primitive::Ingest(IngestPrimitive::Streaming(ingest));
        StreamGraphNode::create(node_id, NodeType::Ingest, name, primitive)
    }

    pub fn process(
        node_id: NodeId,
        process_type: ProcessType,
        name: Option<&str>,
        process: Box<dyn Process>,
    ) -> StreamNodeRef {
        let primitive = Primitive::Process(process);
        StreamGraphNode::create(node_id, NodeType::Process(process_type), name, primitive)
    }

    pub fn emit(node_id: NodeId, name: Option<&str>, emit: Box<dyn Emit>) -> StreamNodeRef {
        let primitive = Primitive::Emit(EmitPrimitive::Standard(emit));
        StreamGraphNode::create(node_id, NodeType::Emit, name, primitive)
    }

    pub(crate) fn buffered_ingest(node_id: NodeId, ingest: BufferedIngest) -> StreamNodeRef {
        let name = format!("BufferedIngest-{}", node_id);
        let primitive = Primitive::Ingest(IngestPrimitive::Buffered(ingest));
        StreamGraphNode::create(node_id, NodeType::Ingest, Some(name.as_str()), primitive)
    }

    pub(crate) fn buffered_emit(node_id: NodeId, emit: BufferedEmit) -> StreamNodeRef {
        let name = format!("BufferedEmit-{}", node_id);
        let primitive = Primitive::Emit(EmitPrimitive::Buffered(emit));
        StreamGraphNode::create(node_id, NodeType::Emit, Some(name.as_str()), primitive)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn is_ingest(&self) -> bool {
        self.node_type == NodeType::Ingest
    }

    pub fn is_process(&self) -> bool {
        self.process_type().is_some()
    }

    pub fn is_emit(&self) -> bool {
        self.node_type == NodeType::Emit
    }

    pub fn process_type(&self) -> Option<ProcessType> {
        match self.node_type {
            NodeType::Process(process_type) => Some(process_type),
            _ => None,
        }
    }

    /// Synthetic inter-task boundary nodes.
    pub fn is_buffered(&self) -> bool {
        match &*self.primitive.borrow() {
            Some(Primitive::Ingest(IngestPrimitive::Buffered(_))) => true,
            Some(Primitive::Emit(EmitPrimitive::Buffered(_))) => true,
            _ => false,
        }
    }

    pub fn has_primitive(&self) -> bool {
        self.primitive.borrow().is_some()
    }

    pub(crate) fn take_primitive(&self) -> Option<Primitive> {
        self.primitive.borrow_mut().take()
    }
}

impl std::fmt::Debug for StreamGraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGraphNode")
            .field("node_id", &self.node_id)
            .field("name", &*self.name.borrow())
            .field("node_type", &self.node_type)
            .finish()
    }
}

/// Logical graph of one or more streams.
///
/// Adjacency lists are ordered; a `None` entry is a placeholder slot reserved
/// for an edge whose target is resolved later.
#[derive(Clone, Debug, Default)]
pub struct StreamGraph {
    node_list: Vec<StreamNodeRef>,
    node_map: HashMap<NodeIndex, Vec<Option<NodeIndex>>>,
    leaf_list: Vec<NodeIndex>,
    root_list: Vec<NodeIndex>,
    node_head: Option<NodeIndex>,
    node_id_map: HashMap<NodeId, NodeIndex>,
}

impl StreamGraph {
    pub fn new() -> Self {
        StreamGraph::default()
    }

    pub fn len(&self) -> usize {
        self.node_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_list.is_empty()
    }

    /// Append a node and make it the head.
    ///
    /// The first node of a graph must be an ingest node.
    pub fn add_node(&mut self, node: StreamNodeRef) -> Result<NodeIndex, DagError> {
        if self.node_list.is_empty() && !node.is_ingest() {
            return Err(DagError::InvalidGraphState(format!(
                "the first node must be an ingest node, got {} node {}",
                node.node_type(),
                node.node_id()
            )));
        }
        if self.node_id_map.contains_key(&node.node_id()) {
            return Err(DagError::InvalidGraphState(format!(
                "node {} is already in the graph",
                node.node_id()
            )));
        }

        let node_index = self.node_list.len();
        if node.is_ingest() {
            self.root_list.push(node_index);
        }
        self.leaf_list.push(node_index);
        self.node_map.insert(node_index, Vec::new());
        self.node_id_map.insert(node.node_id(), node_index);
        self.node_list.push(node);
        self.node_head = Some(node_index);

        Ok(node_index)
    }

    /// Append a node and draw an edge from the current head to it.
    pub fn add_node_to_head(&mut self, node: StreamNodeRef) -> Result<NodeIndex, DagError> {
        let previous_head = self.node_head;
        if let Some(head) = previous_head {
            if self.node_list[head].is_emit() {
                return Err(DagError::InvalidGraphState(format!(
                    "the head node {} is an emit node and accepts no outgoing edge",
                    self.node_list[head].node_id()
                )));
            }
        }

        let node_index = self.add_node(node)?;
        if let Some(head) = previous_head {
            self.add_edge(head, node_index)?;
        }
        Ok(node_index)
    }

    pub fn add_edge(&mut self, source: NodeIndex, target: NodeIndex) -> Result<(), DagError> {
        self.check_edge(source, target)?;
        self.node_map.entry(source).or_default().push(Some(target));
        self.remove_leaf(source);
        Ok(())
    }

    /// Reserve an unresolved outgoing slot on `source`, returning the slot.
    pub fn add_placeholder_edge(&mut self, source: NodeIndex) -> Result<usize, DagError> {
        let node = self.node(source)?;
        if node.is_emit() {
            return Err(DagError::InvalidGraphState(format!(
                "emit node {} accepts no outgoing edge",
                node.node_id()
            )));
        }

        let edges = self.node_map.entry(source).or_default();
        edges.push(None);
        Ok(edges.len() - 1)
    }

    /// Resolve the placeholder `slot` of `source` to `target`.
    pub fn update_placeholder_edge(
        &mut self,
        source: NodeIndex,
        target: NodeIndex,
        slot: usize,
    ) -> Result<(), DagError> {
        self.check_edge(source, target)?;

        let source_id = self.node_list[source].node_id().0;
        let edges = self.node_map.entry(source).or_default();
        match edges.get(slot) {
            Some(None) => edges[slot] = Some(target),
            Some(Some(_)) => {
                return Err(DagError::InvalidGraphState(format!(
                    "slot {} of node {} is already resolved",
                    slot, source_id
                )))
            }
            None => {
                return Err(DagError::InvalidGraphState(format!(
                    "node {} has no placeholder slot {}",
                    source_id, slot
                )))
            }
        }

        self.remove_leaf(source);
        Ok(())
    }

    fn check_edge(&self, source: NodeIndex, target: NodeIndex) -> Result<(), DagError> {
        let source_node = self.node(source)?;
        let target_node = self.node(target)?;

        if self.has_edge(source, target) {
            return Err(DagError::DuplicateEdge {
                source: source_node.node_id().0,
                target: target_node.node_id().0,
            });
        }
        if source_node.is_emit() {
            return Err(DagError::InvalidGraphState(format!(
                "emit node {} accepts no outgoing edge",
                source_node.node_id()
            )));
        }
        if target_node.is_ingest() || source == target {
            return Err(DagError::InvalidGraphState(format!(
                "node {} can not receive an edge from node {}",
                target_node.node_id(),
                source_node.node_id()
            )));
        }
        Ok(())
    }

    fn remove_leaf(&mut self, node_index: NodeIndex) {
        self.leaf_list.retain(|x| *x != node_index);
    }

    /// Drop the unresolved slots of a node.
    pub(crate) fn release_placeholders(&mut self, node_index: NodeIndex) {
        if let Some(edges) = self.node_map.get_mut(&node_index) {
            edges.retain(|x| x.is_some());
        }
    }

    pub fn has_edge(&self, source: NodeIndex, target: NodeIndex) -> bool {
        self.node_map
            .get(&source)
            .map(|edges| edges.contains(&Some(target)))
            .unwrap_or(false)
    }

    /// True iff every leaf is an emit node.
    pub fn verify_graph(&self) -> bool {
        self.leaf_list
            .iter()
            .all(|node_index| self.node_list[*node_index].is_emit())
    }

    pub fn nodes(&self) -> &[StreamNodeRef] {
        self.node_list.as_slice()
    }

    pub fn roots(&self) -> &[NodeIndex] {
        self.root_list.as_slice()
    }

    pub fn leaves(&self) -> &[NodeIndex] {
        self.leaf_list.as_slice()
    }

    /// Ordered outgoing slots of a node, placeholders included.
    pub fn edges(&self, node_index: NodeIndex) -> &[Option<NodeIndex>] {
        self.node_map
            .get(&node_index)
            .map(|x| x.as_slice())
            .unwrap_or(&[])
    }

    /// Resolved children of a node in slot order.
    pub fn children(&self, node_index: NodeIndex) -> Vec<NodeIndex> {
        self.edges(node_index).iter().filter_map(|x| *x).collect()
    }

    pub fn unresolved_edge_count(&self) -> usize {
        self.node_map
            .values()
            .map(|edges| edges.iter().filter(|x| x.is_none()).count())
            .sum()
    }

    pub fn node(&self, node_index: NodeIndex) -> Result<&StreamNodeRef, DagError> {
        self.node_list
            .get(node_index)
            .ok_or_else(|| DagError::NodeNotFound(format!("index {}", node_index)))
    }

    pub fn contains_node_id(&self, node_id: NodeId) -> bool {
        self.node_id_map.contains_key(&node_id)
    }

    pub fn node_index_by_id(&self, node_id: NodeId) -> Result<NodeIndex, DagError> {
        self.node_id_map
            .get(&node_id)
            .map(|x| *x)
            .ok_or_else(|| DagError::NodeNotFound(format!("id {}", node_id)))
    }

    pub fn node_by_id(&self, node_id: NodeId) -> Result<&StreamNodeRef, DagError> {
        let node_index = self.node_index_by_id(node_id)?;
        self.node(node_index)
    }

    pub fn node_index_by_name(&self, name: &str) -> Result<NodeIndex, DagError> {
        self.node_list
            .iter()
            .position(|node| node.name().eq(name))
            .ok_or_else(|| DagError::NodeNotFound(format!("name {}", name)))
    }

    pub fn head_index(&self) -> Option<NodeIndex> {
        self.node_head
    }

    pub fn head_node(&self) -> Result<&StreamNodeRef, DagError> {
        match self.node_head {
            Some(node_index) => self.node(node_index),
            None => Err(DagError::NodeNotFound("head".to_string())),
        }
    }

    pub fn set_head(&mut self, node_index: NodeIndex) -> Result<(), DagError> {
        self.node(node_index)?;
        self.node_head = Some(node_index);
        Ok(())
    }

    pub fn set_head_by_id(&mut self, node_id: NodeId) -> Result<(), DagError> {
        let node_index = self.node_index_by_id(node_id)?;
        self.set_head(node_index)
    }

    pub fn set_head_by_name(&mut self, name: &str) -> Result<(), DagError> {
        let node_index = self.node_index_by_name(name)?;
        self.set_head(node_index)
    }

    pub fn node_name(&self, node_index: NodeIndex) -> Result<String, DagError> {
        self.node(node_index).map(|node| node.name())
    }

    pub fn set_node_name(&self, node_index: NodeIndex, name: &str) -> Result<(), DagError> {
        self.node(node_index).map(|node| node.set_name(name))
    }

    pub fn node_name_by_id(&self, node_id: NodeId) -> Result<String, DagError> {
        self.node_by_id(node_id).map(|node| node.name())
    }

    pub fn set_node_name_by_id(&self, node_id: NodeId, name: &str) -> Result<(), DagError> {
        self.node_by_id(node_id).map(|node| node.set_name(name))
    }

    pub fn name_of_head(&self) -> Result<String, DagError> {
        self.head_node().map(|node| node.name())
    }

    pub fn set_name_of_head(&self, name: &str) -> Result<(), DagError> {
        self.head_node().map(|node| node.set_name(name))
    }
}

#[cfg(test)]
mod tests {
    use crate::api::runtime::IdAllocator;
    use crate::dag::stream_graph::StreamGraph;
    use crate::dag::DagError;
    use crate::test_utils::{emit_node, filter_node, ingest_node, map_node};

    #[test]
    pub fn first_node_must_be_ingest_test() {
        let mut ids = IdAllocator::new();
        let mut graph = StreamGraph::new();

        let rt = graph.add_node(map_node(&mut ids));
        assert!(matches!(rt, Err(DagError::InvalidGraphState(_))));
        assert!(graph.is_empty());

        let rt = graph.add_node(emit_node(&mut ids).0);
        assert!(matches!(rt, Err(DagError::InvalidGraphState(_))));

        assert_eq!(graph.add_node(ingest_node(&mut ids, &[])).unwrap(), 0);
        assert_eq!(graph.roots(), &[0]);
    }

    #[test]
    pub fn add_node_to_head_test() {
        let mut ids = IdAllocator::new();
        let mut graph = StreamGraph::new();

        let ingest = graph.add_node_to_head(ingest_node(&mut ids, &[])).unwrap();
        let map = graph.add_node_to_head(map_node(&mut ids)).unwrap();
        assert!(!graph.verify_graph());

        let emit = graph.add_node_to_head(emit_node(&mut ids).0).unwrap();
        assert!(graph.verify_graph());

        assert_eq!(graph.children(ingest), vec![map]);
        assert_eq!(graph.children(map), vec![emit]);
        assert_eq!(graph.leaves(), &[emit]);
        assert_eq!(graph.head_index(), Some(emit));

        // nothing may follow an emit
        let rt = graph.add_node_to_head(map_node(&mut ids));
        assert!(matches!(rt, Err(DagError::InvalidGraphState(_))));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    pub fn add_edge_test() {
        let mut ids = IdAllocator::new();
        let mut graph = StreamGraph::new();

        let ingest = graph.add_node(ingest_node(&mut ids, &[])).unwrap();
        let filter = graph.add_node(filter_node(&mut ids)).unwrap();
        let emit = graph.add_node(emit_node(&mut ids).0).unwrap();

        graph.add_edge(ingest, filter).unwrap();
        assert!(matches!(
            graph.add_edge(ingest, filter),
            Err(DagError::DuplicateEdge { .. })
        ));
        assert!(matches!(
            graph.add_edge(emit, filter),
            Err(DagError::InvalidGraphState(_))
        ));
        assert!(matches!(
            graph.add_edge(filter, 7),
            Err(DagError::NodeNotFound(_))
        ));

        assert!(!graph.verify_graph());
        graph.add_edge(filter, emit).unwrap();
        assert!(graph.verify_graph());
        assert_eq!(graph.leaves(), &[emit]);
    }

    #[test]
    pub fn placeholder_edge_test() {
        let mut ids = IdAllocator::new();
        let mut graph = StreamGraph::new();

        let ingest = graph.add_node(ingest_node(&mut ids, &[])).unwrap();
        let emit = graph.add_node(emit_node(&mut ids).0).unwrap();

        let slot = graph.add_placeholder_edge(ingest).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(graph.edges(ingest), &[None]);
        assert_eq!(graph.unresolved_edge_count(), 1);
        assert!(graph.children(ingest).is_empty());
        assert!(matches!(
            graph.add_placeholder_edge(emit),
            Err(DagError::InvalidGraphState(_))
        ));

        graph.update_placeholder_edge(ingest, emit, slot).unwrap();
        assert_eq!(graph.edges(ingest), &[Some(emit)]);
        assert_eq!(graph.unresolved_edge_count(), 0);
        assert!(graph.verify_graph());

        assert!(matches!(
            graph.update_placeholder_edge(ingest, emit, slot),
            Err(DagError::DuplicateEdge { .. })
        ));
    }

    #[test]
    pub fn lookup_test() {
        let mut ids = IdAllocator::new();
        let mut graph = StreamGraph::new();

        let ingest_node = ingest_node(&mut ids, &[]);
        let ingest_id = ingest_node.node_id();
        graph.add_node_to_head(ingest_node).unwrap();
        graph.add_node_to_head(map_node(&mut ids)).unwrap();
        graph.set_name_of_head("tokenize").unwrap();
        assert_eq!(graph.name_of_head().unwrap(), "tokenize");

        graph.set_head_by_id(ingest_id).unwrap();
        assert_eq!(graph.head_index(), Some(0));
        graph.set_node_name_by_id(ingest_id, "source").unwrap();
        assert_eq!(graph.node_name(0).unwrap(), "source");

        graph.set_head_by_name("tokenize").unwrap();
        assert_eq!(graph.head_index(), Some(1));
        assert_eq!(graph.node_index_by_name("source").unwrap(), 0);

        assert!(matches!(
            graph.set_head_by_name("missing"),
            Err(DagError::NodeNotFound(_))
        ));
        assert!(matches!(
            graph.node_by_id(crate::api::runtime::NodeId(99)),
            Err(DagError::NodeNotFound(_))
        ));
        // a failed lookup leaves the head untouched
        assert_eq!(graph.head_index(), Some(1));
    }
}
