//! Task runtime: one thread per physical segment, started deepest first and
//! stopped in reverse order by the orchestrator.

pub(crate) mod emit;
pub(crate) mod executor;
pub(crate) mod ingest;
pub mod logger;
pub(crate) mod orchestrator;
pub(crate) mod process;
pub(crate) mod task;

pub use logger::init_log;
pub use orchestrator::ExecutionReport;
pub use task::TaskCompletion;
