//! Inter-task transport: a size/time bounded byte buffer in front of a named
//! channel, with framed element encoding on both ends.

use thiserror::Error;

use crate::api::runtime::ChannelAddress;

pub mod buffered_emit;
pub mod buffered_ingest;
pub mod byte_buffer;
pub mod codec;
pub mod registry;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("address {0} is already bound")]
    AddressInUse(ChannelAddress),
    #[error("nothing is listening on address {0}")]
    NotListening(ChannelAddress),
    #[error("channel {0} is disconnected")]
    Disconnected(ChannelAddress),
    #[error("malformed frame: {0}")]
    Frame(String),
}
