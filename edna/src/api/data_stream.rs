use std::cell::RefCell;
use std::rc::Rc;

use crate::api::context::StreamingContext;
use crate::api::function::{
    AggregateFunction, AggregateProcess, Emit, FilterFunction, FilterProcess, FlattenFunction,
    FlattenProcess, Ingest, MapFunction, MapProcess, Process, Trigger,
};
use crate::api::runtime::{IdAllocator, StreamId};
use crate::dag::stream_graph::{StreamGraph, StreamGraphNode};
use crate::dag::{DagError, ProcessType};
use crate::utils::name::attach_name_suffix;

pub trait TDataStream: Sized {
    fn map<F>(self, map: F) -> Result<DataStream, DagError>
    where
        F: MapFunction + 'static;

    fn filter<F>(self, filter: F) -> Result<DataStream, DagError>
    where
        F: FilterFunction + 'static;

    fn flatten<F>(self, flatten: F) -> Result<DataStream, DagError>
    where
        F: FlattenFunction + 'static;

    /// Emits the running state after every record.
    fn aggregate<F>(self, aggregate: F) -> Result<DataStream, DagError>
    where
        F: AggregateFunction + 'static;

    /// Emits, then resets, the state each time `trigger` fires.
    fn aggregate_with_trigger<F, T>(self, aggregate: F, trigger: T) -> Result<DataStream, DagError>
    where
        F: AggregateFunction + 'static,
        T: Trigger + 'static;

    fn emit<E>(self, emit: E) -> Result<DataStream, DagError>
    where
        E: Emit + 'static;
}

/// One user-declared stream: a logical graph and the head new nodes attach to.
#[derive(Debug)]
pub struct DataStream {
    stream_id: StreamId,
    stream_name: String,
    stream_graph: StreamGraph,
    ids: Rc<RefCell<IdAllocator>>,
}

impl DataStream {
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn stream_name(&self) -> &str {
        self.stream_name.as_str()
    }

    pub fn stream_graph(&self) -> &StreamGraph {
        &self.stream_graph
    }

    pub(crate) fn into_stream_graph(self) -> StreamGraph {
        self.stream_graph
    }

    /// Append a process primitive of the given subtype.
    pub fn process<P>(mut self, process_type: ProcessType, process: P) -> Result<DataStream, DagError>
    where
        P: Process + 'static,
    {
        let node_id = self.ids.borrow_mut().next_node_id();
        let name = attach_name_suffix(process.get_name(), 5);
        let node = StreamGraphNode::process(
            node_id,
            process_type,
            Some(name.as_str()),
            Box::new(process),
        );
        self.stream_graph.add_node_to_head(node)?;
        Ok(self)
    }

    pub fn set_name_of_head(&self, name: &str) -> Result<(), DagError> {
        self.stream_graph.set_name_of_head(name)
    }

    pub fn name_of_head(&self) -> Result<String, DagError> {
        self.stream_graph.name_of_head()
    }

    /// Move the head to the node named `name`.
    pub fn get_stream_by_node_name(mut self, name: &str) -> Result<DataStream, DagError> {
        self.stream_graph.set_head_by_name(name)?;
        Ok(self)
    }

    /// Every leaf is an emit node.
    pub fn verify_stream_graph(&self) -> bool {
        self.stream_graph.verify_graph()
    }

    /// A new stream sharing every node of this one, continuing from the same
    /// head. Shared nodes are merged back when the job is planned.
    pub fn fork(&self) -> DataStream {
        let stream_id = self.ids.borrow_mut().next_stream_id();
        DataStream {
            stream_id,
            stream_name: format!("{}-{}", self.stream_name, stream_id),
            stream_graph: self.stream_graph.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl TDataStream for DataStream {
    fn map<F>(self, map: F) -> Result<DataStream, DagError>
    where
        F: MapFunction + 'static,
    {
        self.process(ProcessType::Map, MapProcess::new(map))
    }

    fn filter<F>(self, filter: F) -> Result<DataStream, DagError>
    where
        F: FilterFunction + 'static,
    {
        self.process(ProcessType::Filter, FilterProcess::new(filter))
    }

    fn flatten<F>(self, flatten: F) -> Result<DataStream, DagError>
    where
        F: FlattenFunction + 'static,
    {
        self.process(ProcessType::Flatten, FlattenProcess::new(flatten))
    }

    fn aggregate<F>(self, aggregate: F) -> Result<DataStream, DagError>
    where
        F: AggregateFunction + 'static,
    {
        self.process(ProcessType::Aggregate, AggregateProcess::new(aggregate))
    }

    fn aggregate_with_trigger<F, T>(self, aggregate: F, trigger: T) -> Result<DataStream, DagError>
    where
        F: AggregateFunction + 'static,
        T: Trigger + 'static,
    {
        let process = AggregateProcess::with_trigger(aggregate, Box::new(trigger));
        self.process(ProcessType::Aggregate, process)
    }

    fn emit<E>(mut self, emit: E) -> Result<DataStream, DagError>
    where
        E: Emit + 'static,
    {
        let node_id = self.ids.borrow_mut().next_node_id();
        let name = attach_name_suffix(emit.get_name(), 5);
        let node = StreamGraphNode::emit(node_id, Some(name.as_str()), Box::new(emit));
        self.stream_graph.add_node_to_head(node)?;
        Ok(self)
    }
}

/// Entry point of the fluent API: a new stream starting at an ingest.
pub struct StreamBuilder;

impl StreamBuilder {
    pub fn build<I>(ingest: I, context: &StreamingContext) -> Result<DataStream, DagError>
    where
        I: Ingest + 'static,
    {
        let name = format!("stream-{}", context.ids().borrow().stream_count());
        StreamBuilder::build_named(ingest, name.as_str(), context)
    }

    pub fn build_named<I>(
        ingest: I,
        stream_name: &str,
        context: &StreamingContext,
    ) -> Result<DataStream, DagError>
    where
        I: Ingest + 'static,
    {
        let ids = context.ids();
        let (stream_id, node_id) = {
            let mut ids = ids.borrow_mut();
            (ids.next_stream_id(), ids.next_node_id())
        };

        let name = attach_name_suffix(ingest.get_name(), 5);
        let node = StreamGraphNode::ingest(node_id, Some(name.as_str()), Box::new(ingest));
        let mut stream_graph = StreamGraph::new();
        stream_graph.add_node(node)?;

        Ok(DataStream {
            stream_id,
            stream_name: stream_name.to_string(),
            stream_graph,
            ids,
        })
    }
}
