//! Bundled primitives: a simulated source, record transforms, aggregates with
//! their triggers, and sinks.

pub mod aggregate;
pub mod emit;
pub mod ingest;
pub mod process;
pub mod trigger;
