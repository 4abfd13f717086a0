use edna::api::context::StreamingContext;
use edna::api::data_stream::{StreamBuilder, TDataStream};
use edna::api::defaults::CONFIGURATION_FILE;
use edna::api::Result;
use edna::functions::aggregate::RecordCount;
use edna::functions::emit::StdoutEmit;
use edna::functions::ingest::SimulatedIngest;
use edna::functions::process::{MapFn, StringFlatten};
use serde_json::{json, Value};

const DEFAULT_LINES: [&str; 2] = ["1 2 3 4", "5 6 7 8"];

/// `lines` from the configuration variables, or a fixed pair of lines.
fn input_lines(context: &StreamingContext) -> Vec<String> {
    let lines: Vec<String> = context
        .get_variable("lines")
        .ok()
        .and_then(|x| x.as_sequence())
        .map(|x| {
            x.iter()
                .filter_map(|line| line.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        DEFAULT_LINES.iter().map(|x| x.to_string()).collect()
    } else {
        lines
    }
}

pub fn run() -> Result<()> {
    let mut context = StreamingContext::from_config_file(".", CONFIGURATION_FILE)?;
    context.init_log()?;

    let lines = input_lines(&context);
    info!("counting words of {} lines", lines.len());

    let stream = StreamBuilder::build_named(SimulatedIngest::from_list(lines), "lines", &context)?
        .flatten(StringFlatten::new(" "))?
        .aggregate(RecordCount::new())?
        .map(MapFn::new("describe", |v: Value| {
            Ok(json!(format!("Number of words: {}", v)))
        }))?
        .emit(StdoutEmit::new())?;
    context.add_stream(stream)?;

    let report = context.execute()?;
    for completion in report.completions.iter() {
        info!(
            "task {} done, {} records in, {} records out",
            completion.task_id, completion.records_in, completion.records_out
        );
    }
    Ok(())
}
