pub mod configuration;
pub mod context;
pub mod data_stream;
pub mod defaults;
pub mod element;
pub mod error;
pub mod function;
pub mod runtime;
pub mod serializer;

pub use error::*;
