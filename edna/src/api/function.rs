//! Primitive contracts: ingest, process and emit.
//!
//! A primitive is constructed with its static configuration, built once its
//! physical placement is known, and closed when its task shuts down. It is never
//! invoked before `build` nor after `close`.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::api::defaults::{
    BUFFER_MAX_SIZE, BUFFER_MAX_TIMEOUT, EMIT_BUFFER_BATCH_SIZE, EMIT_BUFFER_TIMEOUT,
    TASK_PRIMITIVE_HOST,
};
use crate::api::error::Result;
use crate::api::runtime::ChannelAddress;
use crate::api::serializer::{Serializer, STRING_SERIALIZER};
use crate::io::registry::ChannelRegistry;

/// Base class of all primitives.
pub trait Function {
    fn get_name(&self) -> &str;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IngestPattern {
    Standard,
    Buffered,
}

impl Display for IngestPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestPattern::Standard => write!(f, "STANDARD_INGEST"),
            IngestPattern::Buffered => write!(f, "BUFFERED_INGEST"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EmitPattern {
    Standard,
    Buffered,
}

impl Display for EmitPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitPattern::Standard => write!(f, "STANDARD_EMIT"),
            EmitPattern::Buffered => write!(f, "BUFFERED_EMIT"),
        }
    }
}

/// Runtime configuration handed to `build`.
///
/// Standard primitives receive an empty configuration (no address); buffered
/// boundary primitives receive the address of their inter-task buffer.
#[derive(Clone, Debug)]
pub struct BuildConfiguration {
    pub host: String,
    pub address: Option<ChannelAddress>,
    pub max_buffer_size: usize,
    pub max_buffer_timeout: Duration,
    pub(crate) registry: Option<ChannelRegistry>,
}

impl BuildConfiguration {
    pub fn standard() -> Self {
        BuildConfiguration {
            host: TASK_PRIMITIVE_HOST.to_string(),
            address: None,
            max_buffer_size: BUFFER_MAX_SIZE,
            max_buffer_timeout: BUFFER_MAX_TIMEOUT,
            registry: None,
        }
    }

    pub(crate) fn buffered(
        host: &str,
        address: ChannelAddress,
        max_buffer_size: usize,
        max_buffer_timeout: Duration,
        registry: ChannelRegistry,
    ) -> Self {
        BuildConfiguration {
            host: host.to_string(),
            address: Some(address),
            max_buffer_size,
            max_buffer_timeout,
            registry: Some(registry),
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.address.is_some()
    }
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        BuildConfiguration::standard()
    }
}

/// The base interface for sources that produce raw records.
pub trait Ingest
where
    Self: Function + Send,
{
    /// Deserializer applied to every raw record returned by `next`.
    fn serializer(&self) -> &dyn Serializer {
        &STRING_SERIALIZER
    }

    fn build(&mut self, _configuration: &BuildConfiguration) -> Result<()> {
        Ok(())
    }

    fn has_next(&mut self) -> bool {
        true
    }

    /// Blocking fetch of the next raw record.
    fn next(&mut self) -> Result<Bytes>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Period of generated watermarks, none by default.
    fn watermark_interval(&self) -> Option<Duration> {
        None
    }

    /// Period of generated checkpoint markers, none by default.
    fn checkpoint_interval(&self) -> Option<Duration> {
        None
    }

    /// End the stream after this long even if the source is not exhausted.
    fn shutdown_after(&self) -> Option<Duration> {
        None
    }
}

/// Record transform. Zero, one or many outputs per input.
pub trait Process
where
    Self: Function + Send,
{
    fn process(&mut self, value: Value) -> Result<Vec<Value>>;
}

/// The base interface for sinks.
pub trait Emit
where
    Self: Function + Send,
{
    /// Serializer applied to every record before it is buffered.
    fn serializer(&self) -> &dyn Serializer {
        &STRING_SERIALIZER
    }

    /// Number of records collected before `write` is invoked. Must be positive.
    fn emit_buffer_batch_size(&self) -> usize {
        EMIT_BUFFER_BATCH_SIZE
    }

    fn emit_buffer_timeout(&self) -> Duration {
        EMIT_BUFFER_TIMEOUT
    }

    fn build(&mut self, _configuration: &BuildConfiguration) -> Result<()> {
        Ok(())
    }

    /// Write a batch of serialized records.
    fn write(&mut self, emit_buffer: &[Bytes]) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One input, one output.
pub trait MapFunction
where
    Self: Function + Send,
{
    fn map(&mut self, value: Value) -> Result<Value>;
}

/// One input, at most one output.
pub trait FilterFunction
where
    Self: Function + Send,
{
    fn filter(&mut self, value: Value) -> Result<Option<Value>>;
}

/// One input, any number of outputs.
pub trait FlattenFunction
where
    Self: Function + Send,
{
    fn flatten(&mut self, value: Value) -> Result<Vec<Value>>;
}

/// Folds records into internal state, releasing `triggered_emit` when triggered.
pub trait AggregateFunction
where
    Self: Function + Send,
{
    fn aggregate(&mut self, value: &Value) -> Result<()>;
    fn triggered_emit(&self) -> Vec<Value>;
    fn reset(&mut self);
}

/// Decides, record by record, when an aggregate releases its state.
pub trait Trigger: Send {
    fn check(&mut self, value: &Value) -> bool;
}

pub struct MapProcess<F> {
    function: F,
}

impl<F> MapProcess<F>
where
    F: MapFunction,
{
    pub fn new(function: F) -> Self {
        MapProcess { function }
    }
}

impl<F> Function for MapProcess<F>
where
    F: MapFunction,
{
    fn get_name(&self) -> &str {
        self.function.get_name()
    }
}

impl<F> Process for MapProcess<F>
where
    F: MapFunction,
{
    fn process(&mut self, value: Value) -> Result<Vec<Value>> {
        Ok(vec![self.function.map(value)?])
    }
}

pub struct FilterProcess<F> {
    function: F,
}

impl<F> FilterProcess<F>
where
    F: FilterFunction,
{
    pub fn new(function: F) -> Self {
        FilterProcess { function }
    }
}

impl<F> Function for FilterProcess<F>
where
    F: FilterFunction,
{
    fn get_name(&self) -> &str {
        self.function.get_name()
    }
}

impl<F> Process for FilterProcess<F>
where
    F: FilterFunction,
{
    fn process(&mut self, value: Value) -> Result<Vec<Value>> {
        Ok(self.function.filter(value)?.into_iter().collect())
    }
}

pub struct FlattenProcess<F> {
    function: F,
}

impl<F> FlattenProcess<F>
where
    F: FlattenFunction,
{
    pub fn new(function: F) -> Self {
        FlattenProcess { function }
    }
}

impl<F> Function for FlattenProcess<F>
where
    F: FlattenFunction,
{
    fn get_name(&self) -> &str {
        self.function.get_name()
    }
}

impl<F> Process for FlattenProcess<F>
where
    F: FlattenFunction,
{
    fn process(&mut self, value: Value) -> Result<Vec<Value>> {
        self.function.flatten(value)
    }
}

/// Without a trigger the running state is released after every record and
/// never reset. With a trigger the state is released, then reset, each time the
/// trigger fires.
pub struct AggregateProcess<F> {
    function: F,
    trigger: Option<Box<dyn Trigger>>,
}

impl<F> AggregateProcess<F>
where
    F: AggregateFunction,
{
    pub fn new(function: F) -> Self {
        AggregateProcess {
            function,
            trigger: None,
        }
    }

    pub fn with_trigger(function: F, trigger: Box<dyn Trigger>) -> Self {
        AggregateProcess {
            function,
            trigger: Some(trigger),
        }
    }
}

impl<F> Function for AggregateProcess<F>
where
    F: AggregateFunction,
{
    fn get_name(&self) -> &str {
        self.function.get_name()
    }
}

impl<F> Process for AggregateProcess<F>
where
    F: AggregateFunction,
{
    fn process(&mut self, value: Value) -> Result<Vec<Value>> {
        self.function.aggregate(&value)?;
        match self.trigger.as_mut() {
            None => Ok(self.function.triggered_emit()),
            Some(trigger) => {
                if trigger.check(&value) {
                    let emitted = self.function.triggered_emit();
                    self.function.reset();
                    Ok(emitted)
                } else {
                    Ok(vec![])
                }
            }
        }
    }
}
