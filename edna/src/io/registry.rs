use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

use crate::api::runtime::ChannelAddress;
use crate::channel::receiver::ChannelReceiver;
use crate::channel::sender::ChannelSender;
use crate::channel::named_channel;
use crate::io::TransportError;
use crate::metrics::Tag;

/// Address book of the inter-task channels of one job.
///
/// A consumer binds an address before its producer connects to it. Every
/// address has a single producer: `connect` hands out the registered sender,
/// so the consumer observes a disconnect once that producer is dropped.
#[derive(Clone, Debug)]
pub struct ChannelRegistry {
    channels: Arc<DashMap<ChannelAddress, Option<ChannelSender<Bytes>>>>,
    capacity: usize,
}

impl ChannelRegistry {
    pub fn new(capacity: usize) -> Self {
        ChannelRegistry {
            channels: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish a channel on `address` and return its receiving end.
    pub fn bind(
        &self,
        address: ChannelAddress,
    ) -> Result<ChannelReceiver<Bytes>, TransportError> {
        if self.channels.contains_key(&address) {
            return Err(TransportError::AddressInUse(address));
        }

        let (sender, receiver) = named_channel(
            "InterTask",
            vec![Tag::new("address", address.0.to_string())],
            self.capacity,
        );
        self.channels.insert(address, Some(sender));
        debug!("bind inter-task channel on address {}", address);

        Ok(receiver)
    }

    /// Take the producer end of a bound address.
    pub fn connect(&self, address: ChannelAddress) -> Result<ChannelSender<Bytes>, TransportError> {
        match self.channels.get_mut(&address) {
            Some(mut entry) => entry
                .value_mut()
                .take()
                .ok_or(TransportError::AddressInUse(address)),
            None => Err(TransportError::NotListening(address)),
        }
    }

    pub fn unbind(&self, address: ChannelAddress) {
        self.channels.remove(&address);
    }

    pub fn is_bound(&self, address: ChannelAddress) -> bool {
        self.channels.contains_key(&address)
    }
}
