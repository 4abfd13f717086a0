#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate anyhow;

pub mod api;
pub mod channel;
pub mod dag;
pub mod functions;
pub mod io;
pub mod metrics;
pub mod runtime;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
