//! Engine defaults.

use std::time::Duration;

/// Maximum size in bytes of an inter-task buffer before it is flushed.
pub const BUFFER_MAX_SIZE: usize = 32768;
/// Maximum age of a partially filled inter-task buffer.
pub const BUFFER_MAX_TIMEOUT: Duration = Duration::from_millis(100);

pub const TASK_PRIMITIVE_HOST: &str = "0.0.0.0";
/// Wait used by the orchestrator and tasks while polling for status.
pub const TASK_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Frames an inter-task channel holds before the producer blocks.
pub const CHANNEL_CAPACITY: usize = 1024;

pub const EMIT_BUFFER_BATCH_SIZE: usize = 10;
pub const EMIT_BUFFER_TIMEOUT: Duration = Duration::from_millis(100);

pub const CONFIGURATION_FILE: &str = "ednaconf.yaml";
