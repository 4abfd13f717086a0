//! In-process counters and gauges.
//!
//! Values live in atomics owned by the component that registered them and are
//! pushed to the `metrics` facade by [`compute`]; without an installed recorder
//! the push is a no-op.

pub mod metric;

pub use metric::compute;
pub use metric::register_counter;
pub use metric::register_gauge;
pub use metric::{Counter, Gauge, Tag};
