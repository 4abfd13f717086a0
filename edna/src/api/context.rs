use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use serde_yaml::Value;

use crate::api::configuration::{ConfigurationError, EngineOptions, StreamingConfiguration};
use crate::api::data_stream::DataStream;
use crate::api::error::Result;
use crate::api::runtime::{IdAllocator, StreamId};
use crate::dag::execution_graph::ExecutionGraph;
use crate::dag::flattener::StreamGraphFlattener;
use crate::dag::physic_graph::{PhysicalGraph, PhysicalGraphBuilder};
use crate::dag::stream_graph::StreamGraph;
use crate::dag::DagError;
use crate::runtime::logger::init_log;
use crate::runtime::ExecutionReport;
use crate::utils::VERSION;

/// Owns the configuration, the id allocator and the streams of one job.
#[derive(Debug)]
pub struct StreamingContext {
    configuration: StreamingConfiguration,
    options: EngineOptions,
    ids: Rc<RefCell<IdAllocator>>,
    streams: BTreeMap<StreamId, StreamGraph>,
}

impl StreamingContext {
    pub fn new() -> Self {
        StreamingContext {
            configuration: StreamingConfiguration::new(),
            options: EngineOptions::default(),
            ids: Rc::new(RefCell::new(IdAllocator::new())),
            streams: BTreeMap::new(),
        }
    }

    pub fn with_configuration(
        configuration: StreamingConfiguration,
    ) -> std::result::Result<Self, ConfigurationError> {
        let options = EngineOptions::from_configuration(&configuration)?;
        Ok(StreamingContext {
            configuration,
            options,
            ids: Rc::new(RefCell::new(IdAllocator::new())),
            streams: BTreeMap::new(),
        })
    }

    /// Load `dir/file`; a missing file gives an empty configuration.
    pub fn from_config_file<P: AsRef<Path>>(
        dir: P,
        file: &str,
    ) -> std::result::Result<Self, ConfigurationError> {
        let configuration = StreamingConfiguration::load(dir, file)?;
        StreamingContext::with_configuration(configuration)
    }

    pub(crate) fn ids(&self) -> Rc<RefCell<IdAllocator>> {
        self.ids.clone()
    }

    pub fn configuration(&self) -> &StreamingConfiguration {
        &self.configuration
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn get_variable(&self, key: &str) -> std::result::Result<&Value, ConfigurationError> {
        self.configuration.get_variable(key)
    }

    /// Install the logger described by the `log_level` and `log_file` options.
    pub fn init_log(&self) -> Result<()> {
        let log_file = self.options.log_file.as_ref().map(|x| Path::new(x.as_str()));
        init_log(self.options.log_level.as_str(), log_file)
    }

    pub fn add_stream(&mut self, stream: DataStream) -> std::result::Result<(), DagError> {
        let stream_id = stream.stream_id();
        if self.streams.contains_key(&stream_id) {
            return Err(DagError::DuplicateStream(stream_id.0));
        }
        if !stream.verify_stream_graph() {
            warn!(
                "stream {} has a leaf that is not an emit node",
                stream.stream_name()
            );
        }

        info!("add stream {}({})", stream.stream_name(), stream_id);
        self.streams.insert(stream_id, stream.into_stream_graph());
        Ok(())
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn physical_graph(&self) -> std::result::Result<PhysicalGraph, DagError> {
        if self.streams.is_empty() {
            return Err(DagError::InvalidGraphState(
                "no stream added to the context".to_string(),
            ));
        }

        let stream_graph = StreamGraphFlattener::flatten(self.streams.values())?;
        let mut ids = self.ids.borrow_mut();
        let physical_graph = PhysicalGraphBuilder::new(&stream_graph, &mut ids).build()?;
        Ok(physical_graph)
    }

    /// The physical plan as JSON.
    pub fn explain(&self) -> std::result::Result<String, DagError> {
        self.physical_graph()?.explain()
    }

    /// Plan and run every added stream. Planning errors are returned before
    /// any task starts; the streams are consumed either way.
    pub fn execute(&mut self) -> Result<ExecutionReport> {
        let planned = self.physical_graph().and_then(|physical_graph| {
            let mut ids = self.ids.borrow_mut();
            let execution_graph = ExecutionGraph::build(&physical_graph, &mut ids, &self.options)?;
            Ok(execution_graph)
        });
        self.streams.clear();

        let execution_graph = planned?;
        info!(
            "edna {} execute {} tasks",
            VERSION,
            execution_graph.task_count()
        );
        execution_graph.execute()
    }

    /// `execute`, keeping only the outcome.
    pub fn run(&mut self) -> Result<()> {
        let report = self.execute()?;
        for completion in &report.completions {
            debug!("{:?}", completion);
        }
        Ok(())
    }
}

impl Default for StreamingContext {
    fn default() -> Self {
        StreamingContext::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::api::context::StreamingContext;
    use crate::api::data_stream::{StreamBuilder, TDataStream};
    use crate::api::runtime::PhysicalNodeId;
    use crate::dag::DagError;
    use crate::functions::aggregate::RecordCount;
    use crate::functions::emit::CollectEmit;
    use crate::functions::ingest::SimulatedIngest;
    use crate::functions::process::{JsonToObject, KeyedFilter, MapFn, ObjectToJson, StringFlatten};

    #[test]
    pub fn word_count_test() {
        let mut context = StreamingContext::new();
        let emit = CollectEmit::new();
        let outputs = emit.outputs();

        let stream = StreamBuilder::build(
            SimulatedIngest::from_list(vec!["1 2 3 4", "5 6 7 8"]),
            &context,
        )
        .unwrap()
        .flatten(StringFlatten::new(" "))
        .unwrap()
        .aggregate(RecordCount::new())
        .unwrap()
        .map(MapFn::new("describe", |v: Value| {
            Ok(json!(format!("Number of words: {}", v)))
        }))
        .unwrap()
        .emit(emit)
        .unwrap();
        context.add_stream(stream).unwrap();

        let explain = context.explain().unwrap();
        assert!(explain.contains("\"physical_id\""));

        let report = context.execute().unwrap();
        assert_eq!(report.completions.len(), 3);
        assert!(report.completions.iter().all(|x| x.is_success()));

        // deepest segment first, stopped in reverse
        let started = report.started_physical();
        assert_eq!(started.len(), 3);
        let stopped: Vec<PhysicalNodeId> = started.iter().rev().cloned().collect();
        assert_eq!(report.stopped_physical(), stopped);

        let outputs = outputs.lock().unwrap();
        assert_eq!(outputs.len(), 8);
        assert_eq!(
            outputs.last().map(|x| x.as_str()),
            Some("Number of words: 8")
        );
    }

    #[test]
    pub fn shutdown_order_test() {
        let mut context = StreamingContext::new();
        let stream = StreamBuilder::build(SimulatedIngest::from_list(vec!["a b"]), &context)
            .unwrap()
            .flatten(StringFlatten::new(" "))
            .unwrap()
            .aggregate(RecordCount::new())
            .unwrap()
            .emit(CollectEmit::new())
            .unwrap();
        context.add_stream(stream).unwrap();

        let report = context.execute().unwrap();
        assert_eq!(
            report.started_physical(),
            vec![PhysicalNodeId(2), PhysicalNodeId(1), PhysicalNodeId(0)]
        );
        assert_eq!(
            report.stopped_physical(),
            vec![PhysicalNodeId(0), PhysicalNodeId(1), PhysicalNodeId(2)]
        );
    }

    #[test]
    pub fn json_filter_test() {
        let records: Vec<String> = (201..=210)
            .map(|id| json!({ "actor_id": id, "name": format!("actor-{}", id) }).to_string())
            .collect();

        let mut context = StreamingContext::new();
        let emit = CollectEmit::new();
        let outputs = emit.outputs();
        let stream = StreamBuilder::build(SimulatedIngest::from_list(records), &context)
            .unwrap()
            .map(JsonToObject::new())
            .unwrap()
            .filter(KeyedFilter::new("actor_id", |v: &Value| {
                v.as_i64().map(|id| id > 205).unwrap_or(false)
            }))
            .unwrap()
            .map(ObjectToJson::new())
            .unwrap()
            .emit(emit)
            .unwrap();
        context.add_stream(stream).unwrap();

        let report = context.execute().unwrap();
        assert_eq!(report.completions.len(), 2);

        let outputs = outputs.lock().unwrap();
        assert_eq!(outputs.len(), 5);
        let ids: Vec<i64> = outputs
            .iter()
            .map(|x| serde_json::from_str::<Value>(x).unwrap()["actor_id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![206, 207, 208, 209, 210]);
    }

    #[test]
    pub fn failed_task_test() {
        let mut context = StreamingContext::new();
        let stream = StreamBuilder::build(
            SimulatedIngest::from_fn(|index| Some(index.to_string())),
            &context,
        )
        .unwrap()
        .flatten(StringFlatten::new(" "))
        .unwrap()
        .map(MapFn::new("reject", |v: Value| {
            if v == json!("5") {
                Err(anyhow!("malformed record {}", v).into())
            } else {
                Ok(v)
            }
        }))
        .unwrap()
        .emit(CollectEmit::new())
        .unwrap();
        context.add_stream(stream).unwrap();

        let err = context.execute().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("physical node 1"), "{}", msg);
        assert!(msg.contains("malformed record"), "{}", msg);
    }

    #[test]
    pub fn planning_error_test() {
        let mut context = StreamingContext::new();
        assert!(context.execute().is_err());

        let stream = StreamBuilder::build(SimulatedIngest::from_list(vec!["a"]), &context)
            .unwrap()
            .map(MapFn::new("identity", |v: Value| Ok(v)))
            .unwrap();
        let fork = stream.fork();
        let stream = stream.emit(CollectEmit::new()).unwrap();
        let fork = fork.emit(CollectEmit::new()).unwrap();
        context.add_stream(stream).unwrap();
        context.add_stream(fork).unwrap();

        // fan-out is rejected before any task starts
        let err = context.execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DagError>(),
            Some(DagError::BranchingNotSupported(_))
        ));
    }

    #[test]
    pub fn run_test() {
        let mut context = StreamingContext::new();
        let emit = CollectEmit::new();
        let outputs = emit.outputs();
        let stream = StreamBuilder::build(SimulatedIngest::from_list(vec!["x", "y"]), &context)
            .unwrap()
            .emit(emit)
            .unwrap();
        context.add_stream(stream).unwrap();

        context.run().unwrap();
        assert_eq!(outputs.lock().unwrap().as_slice(), ["x", "y"]);

        // the streams were consumed by the first run
        assert!(context.run().is_err());
    }

    #[test]
    pub fn duplicate_stream_test() {
        let mut context = StreamingContext::new();
        let other = StreamingContext::new();

        let stream = StreamBuilder::build(SimulatedIngest::from_list(vec!["a"]), &context)
            .unwrap()
            .emit(CollectEmit::new())
            .unwrap();
        let fork = stream.fork();
        context.add_stream(stream).unwrap();
        context.add_stream(fork).unwrap();
        assert_eq!(context.stream_count(), 2);

        // stream ids are only unique within the context that created them
        let foreign = StreamBuilder::build(SimulatedIngest::from_list(vec!["b"]), &other)
            .unwrap()
            .emit(CollectEmit::new())
            .unwrap();
        let rt = context.add_stream(foreign);
        assert!(matches!(rt, Err(DagError::DuplicateStream(0))));
        assert_eq!(context.stream_count(), 2);
    }

    #[test]
    pub fn config_file_test() {
        let dir = std::env::temp_dir();
        let file = format!("edna-{}.yaml", uuid::Uuid::new_v4());
        std::fs::write(
            dir.join(&file),
            "variables:\n  separator: \" \"\noptions:\n  buffer_max_size: 64\n",
        )
        .unwrap();

        let context = StreamingContext::from_config_file(&dir, file.as_str()).unwrap();
        assert_eq!(context.get_variable("separator").unwrap().as_str(), Some(" "));
        assert_eq!(context.options().buffer_max_size, 64);
        std::fs::remove_file(dir.join(&file)).unwrap();
    }
}
