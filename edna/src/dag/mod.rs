//! DAG builder
//! stream_graph -> (flattener) -> physic_graph -> execution_graph

use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::api::function::{Emit, EmitPattern, Function, Ingest, IngestPattern, Process};
use crate::io::buffered_emit::BufferedEmit;
use crate::io::buffered_ingest::BufferedIngest;

pub(crate) mod execution_graph;
pub(crate) mod flattener;
pub(crate) mod physic_graph;
pub(crate) mod stream_graph;
pub(crate) mod utils;

pub use execution_graph::ExecutionGraph;
pub use flattener::StreamGraphFlattener;
pub use physic_graph::{PhysicalGraph, PhysicalGraphBuilder, PhysicalGraphNode};
pub use stream_graph::{StreamGraph, StreamGraphNode, StreamNodeRef};

#[derive(Debug)]
pub enum DagError {
    InvalidGraphState(String),
    DuplicateEdge { source: u32, target: u32 },
    NodeNotFound(String),
    PhysicalGraphNodeDoesNotExist(u32),
    NodeNotChainable(u32),
    NodeAlreadyMapped(u32),
    DuplicateStream(u32),
    PrimitiveNotSet(u32),
    BranchingNotSupported(u32),
    IncompleteSegment(u32),
}

impl Error for DagError {}

impl Display for DagError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DagError::InvalidGraphState(s) => write!(f, "InvalidGraphState({})", s),
            DagError::DuplicateEdge { source, target } => {
                write!(f, "DuplicateEdge({}->{})", source, target)
            }
            DagError::NodeNotFound(s) => write!(f, "NodeNotFound({})", s),
            DagError::PhysicalGraphNodeDoesNotExist(id) => {
                write!(f, "PhysicalGraphNodeDoesNotExist({})", id)
            }
            DagError::NodeNotChainable(id) => write!(f, "NodeNotChainable({})", id),
            DagError::NodeAlreadyMapped(id) => write!(f, "NodeAlreadyMapped({})", id),
            DagError::DuplicateStream(id) => write!(f, "DuplicateStream({})", id),
            DagError::PrimitiveNotSet(id) => write!(f, "PrimitiveNotSet({})", id),
            DagError::BranchingNotSupported(id) => write!(f, "BranchingNotSupported({})", id),
            DagError::IncompleteSegment(id) => write!(f, "IncompleteSegment({})", id),
        }
    }
}

/// Process node subtype. Only `Map` is strictly one-in-one-out and can be
/// fused with its neighbours.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub enum ProcessType {
    Map,
    Filter,
    Flatten,
    Aggregate,
}

impl ProcessType {
    pub fn is_one_to_one(&self) -> bool {
        *self == ProcessType::Map
    }
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub enum NodeType {
    Ingest,
    Process(ProcessType),
    Emit,
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Ingest => write!(f, "INGEST"),
            NodeType::Process(process_type) => write!(f, "PROCESS({:?})", process_type),
            NodeType::Emit => write!(f, "EMIT"),
        }
    }
}

pub enum IngestPrimitive {
    Streaming(Box<dyn Ingest>),
    Buffered(BufferedIngest),
}

impl IngestPrimitive {
    pub fn execution_mode(&self) -> IngestPattern {
        match self {
            IngestPrimitive::Streaming(_) => IngestPattern::Standard,
            IngestPrimitive::Buffered(ingest) => ingest.execution_mode(),
        }
    }
}

pub enum EmitPrimitive {
    Standard(Box<dyn Emit>),
    Buffered(BufferedEmit),
}

impl EmitPrimitive {
    pub fn emit_pattern(&self) -> EmitPattern {
        match self {
            EmitPrimitive::Standard(_) => EmitPattern::Standard,
            EmitPrimitive::Buffered(emit) => emit.emit_pattern(),
        }
    }
}

/// The unit of work wrapped by a stream graph node.
pub enum Primitive {
    Ingest(IngestPrimitive),
    Process(Box<dyn Process>),
    Emit(EmitPrimitive),
}

impl Primitive {
    pub fn name(&self) -> &str {
        match self {
            Primitive::Ingest(IngestPrimitive::Streaming(ingest)) => ingest.get_name(),
            Primitive::Ingest(IngestPrimitive::Buffered(ingest)) => ingest.get_name(),
            Primitive::Process(process) => process.get_name(),
            Primitive::Emit(EmitPrimitive::Standard(emit)) => emit.get_name(),
            Primitive::Emit(EmitPrimitive::Buffered(emit)) => emit.get_name(),
        }
    }
}
