pub mod date_time;
pub mod name;
pub mod thread;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
