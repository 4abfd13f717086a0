use std::time::Duration;

use bytes::Bytes;

use crate::api::defaults::BUFFER_MAX_TIMEOUT;
use crate::api::element::{RecordCollection, StreamElement};
use crate::api::error::Result;
use crate::api::function::{BuildConfiguration, Function, IngestPattern};
use crate::api::runtime::{ChannelAddress, PhysicalNodeId};
use crate::api::serializer::BufferedSerializer;
use crate::channel::receiver::ChannelReceiver;
use crate::channel::RecvTimeoutError;
use crate::io::codec::LengthDelimitedSerializer;
use crate::io::registry::ChannelRegistry;

/// Consumer side of an inter-task boundary.
///
/// Each fetch waits at most the buffer timeout for the next chunk, so the
/// owning task regains control regularly to check its own output buffer.
pub struct BufferedIngest {
    name: String,
    receive_from: PhysicalNodeId,
    serializer: LengthDelimitedSerializer,
    binding: Option<(ChannelAddress, ChannelRegistry, ChannelReceiver<Bytes>)>,
    max_buffer_timeout: Duration,
    shutdown_received: bool,
}

impl BufferedIngest {
    pub fn new(receive_from: PhysicalNodeId) -> Self {
        BufferedIngest {
            name: "BufferedIngest".to_string(),
            receive_from,
            serializer: LengthDelimitedSerializer::new(),
            binding: None,
            max_buffer_timeout: BUFFER_MAX_TIMEOUT,
            shutdown_received: false,
        }
    }

    /// The upstream segment writing into this ingest.
    pub fn receive_from(&self) -> PhysicalNodeId {
        self.receive_from
    }

    pub fn execution_mode(&self) -> IngestPattern {
        IngestPattern::Buffered
    }

    pub fn build(&mut self, configuration: &BuildConfiguration) -> Result<()> {
        let (address, registry) = match (configuration.address, configuration.registry.as_ref()) {
            (Some(address), Some(registry)) => (address, registry.clone()),
            _ => return Err(anyhow!("{} requires a buffered build configuration", self.name).into()),
        };

        let receiver = registry.bind(address)?;
        self.name = format!("BufferedIngest-{}", address);
        self.max_buffer_timeout = configuration.max_buffer_timeout;
        self.binding = Some((address, registry, receiver));

        debug!("{} bound, receiving from segment {}", self.name, self.receive_from);
        Ok(())
    }

    pub fn has_next(&self) -> bool {
        !self.shutdown_received
    }

    /// Every element decodable from the next received chunk; empty when no
    /// chunk arrived within the buffer timeout.
    pub fn fetch(&mut self) -> Result<RecordCollection> {
        let mut collection = RecordCollection::new();
        let (address, _, receiver) = match self.binding.as_ref() {
            Some(binding) => binding,
            None => return Err(anyhow!("{} is not built", self.name).into()),
        };

        match receiver.recv_timeout(self.max_buffer_timeout) {
            Ok(chunk) => self.serializer.feed(chunk.as_ref()),
            Err(RecvTimeoutError::Timeout) => return Ok(collection),
            Err(RecvTimeoutError::Disconnected) => {
                if !self.shutdown_received {
                    warn!(
                        "channel {} disconnected before end of stream, shutting down",
                        address
                    );
                    self.shutdown_received = true;
                    collection.push(StreamElement::shutdown());
                }
                return Ok(collection);
            }
        }

        while let Some(element) = self.serializer.next()? {
            if element.is_shutdown() {
                self.shutdown_received = true;
            }
            collection.push(element);
        }
        Ok(collection)
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some((address, registry, _receiver)) = self.binding.take() {
            registry.unbind(address);
            debug!("{} closed", self.name);
        }
        Ok(())
    }
}

impl Function for BufferedIngest {
    fn get_name(&self) -> &str {
        self.name.as_str()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::api::element::StreamElement;
    use crate::api::function::{BuildConfiguration, Function};
    use crate::api::runtime::{ChannelAddress, PhysicalNodeId};
    use crate::io::buffered_emit::BufferedEmit;
    use crate::io::buffered_ingest::BufferedIngest;
    use crate::io::registry::ChannelRegistry;

    fn configuration(registry: &ChannelRegistry, max_buffer_size: usize) -> BuildConfiguration {
        BuildConfiguration::buffered(
            "0.0.0.0",
            ChannelAddress(1),
            max_buffer_size,
            Duration::from_millis(20),
            registry.clone(),
        )
    }

    #[test]
    pub fn boundary_transfer_test() {
        let registry = ChannelRegistry::new(16);
        // a buffer smaller than one frame forces frames across chunks
        let configuration = configuration(&registry, 7);

        let mut ingest = BufferedIngest::new(PhysicalNodeId(0));
        let mut emit = BufferedEmit::new();
        assert!(emit.build(&configuration).is_err());

        ingest.build(&configuration).unwrap();
        emit.build(&configuration).unwrap();
        assert_eq!(ingest.get_name(), "BufferedIngest-1");

        let frames = vec![
            emit.encode(&StreamElement::record(json!("1 2"))).unwrap(),
            emit.encode(&StreamElement::watermark()).unwrap(),
            emit.encode(&StreamElement::record(json!({"n": 2}))).unwrap(),
            emit.encode(&StreamElement::shutdown()).unwrap(),
        ];
        emit.write(frames.as_slice()).unwrap();

        let mut received = Vec::new();
        while ingest.has_next() {
            received.extend(ingest.fetch().unwrap());
        }

        assert_eq!(received.len(), 4);
        assert_eq!(received[0].as_record().unwrap().value(), &json!("1 2"));
        assert!(received[1].is_watermark());
        assert_eq!(received[2].as_record().unwrap().value(), &json!({"n": 2}));
        assert!(received[3].is_shutdown());

        emit.close().unwrap();
        ingest.close().unwrap();
    }

    #[test]
    pub fn timeout_and_disconnect_test() {
        let registry = ChannelRegistry::new(16);
        let configuration = configuration(&registry, 1024);

        let mut ingest = BufferedIngest::new(PhysicalNodeId(0));
        ingest.build(&configuration).unwrap();
        let mut emit = BufferedEmit::new();
        emit.build(&configuration).unwrap();

        // nothing sent within the timeout
        assert!(ingest.fetch().unwrap().is_empty());

        // producer gone without an end-of-stream marker
        emit.close().unwrap();
        drop(emit);
        let collection = ingest.fetch().unwrap();
        assert_eq!(collection.len(), 1);
        assert!(collection.contains_shutdown());
        assert!(!ingest.has_next());
        assert!(ingest.fetch().unwrap().is_empty());
    }
}
