use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::api::error::Result;
use crate::api::function::{
    AggregateProcess, FilterFunction, FilterProcess, FlattenProcess, Function, MapProcess,
};
use crate::api::runtime::IdAllocator;
use crate::dag::stream_graph::{StreamGraphNode, StreamNodeRef};
use crate::dag::ProcessType;
use crate::functions::aggregate::RecordCount;
use crate::functions::emit::CollectEmit;
use crate::functions::ingest::SimulatedIngest;
use crate::functions::process::{MapFn, StringFlatten};

struct PassAll;

impl Function for PassAll {
    fn get_name(&self) -> &str {
        "PassAll"
    }
}

impl FilterFunction for PassAll {
    fn filter(&mut self, value: Value) -> Result<Option<Value>> {
        Ok(Some(value))
    }
}

pub(crate) fn ingest_node(ids: &mut IdAllocator, records: &[&str]) -> StreamNodeRef {
    let ingest = SimulatedIngest::from_list(records.to_vec());
    StreamGraphNode::ingest(ids.next_node_id(), None, Box::new(ingest))
}

pub(crate) fn map_node(ids: &mut IdAllocator) -> StreamNodeRef {
    let map = MapProcess::new(MapFn::new("identity", |v: Value| Ok(v)));
    StreamGraphNode::process(ids.next_node_id(), ProcessType::Map, None, Box::new(map))
}

pub(crate) fn filter_node(ids: &mut IdAllocator) -> StreamNodeRef {
    let filter = FilterProcess::new(PassAll);
    StreamGraphNode::process(ids.next_node_id(), ProcessType::Filter, None, Box::new(filter))
}

pub(crate) fn flatten_node(ids: &mut IdAllocator) -> StreamNodeRef {
    let flatten = FlattenProcess::new(StringFlatten::new(" "));
    StreamGraphNode::process(ids.next_node_id(), ProcessType::Flatten, None, Box::new(flatten))
}

pub(crate) fn aggregate_node(ids: &mut IdAllocator) -> StreamNodeRef {
    let aggregate = AggregateProcess::new(RecordCount::new());
    StreamGraphNode::process(
        ids.next_node_id(),
        ProcessType::Aggregate,
        None,
        Box::new(aggregate),
    )
}

pub(crate) fn emit_node(ids: &mut IdAllocator) -> (StreamNodeRef, Arc<Mutex<Vec<String>>>) {
    let emit = CollectEmit::new();
    let outputs = emit.outputs();
    let node = StreamGraphNode::emit(ids.next_node_id(), None, Box::new(emit));
    (node, outputs)
}
