use bytes::Bytes;

use crate::api::element::StreamElement;
use crate::api::error::Result;
use crate::api::function::{BuildConfiguration, EmitPattern, Function};
use crate::api::serializer::BufferedSerializer;
use crate::io::byte_buffer::{ByteBuffer, ChannelSink};
use crate::io::codec::LengthDelimitedSerializer;

/// Producer side of an inter-task boundary.
///
/// Frames are written through a `ByteBuffer` into the channel bound by the
/// downstream segment's `BufferedIngest`.
pub struct BufferedEmit {
    name: String,
    serializer: LengthDelimitedSerializer,
    byte_buffer: Option<ByteBuffer<ChannelSink>>,
}

impl BufferedEmit {
    pub fn new() -> Self {
        BufferedEmit {
            name: "BufferedEmit".to_string(),
            serializer: LengthDelimitedSerializer::new(),
            byte_buffer: None,
        }
    }

    pub fn emit_pattern(&self) -> EmitPattern {
        EmitPattern::Buffered
    }

    pub fn build(&mut self, configuration: &BuildConfiguration) -> Result<()> {
        let (address, registry) = match (configuration.address, configuration.registry.as_ref()) {
            (Some(address), Some(registry)) => (address, registry),
            _ => return Err(anyhow!("{} requires a buffered build configuration", self.name).into()),
        };

        let sender = registry.connect(address)?;
        self.name = format!("BufferedEmit-{}", address);
        self.byte_buffer = Some(ByteBuffer::new(
            ChannelSink::new(address, sender),
            configuration.max_buffer_size,
            configuration.max_buffer_timeout,
        ));

        debug!("{} connected", self.name);
        Ok(())
    }

    /// Frame one element, control elements included.
    pub fn encode(&mut self, element: &StreamElement) -> Result<Bytes> {
        self.serializer.write(element)
    }

    fn byte_buffer(&mut self) -> Result<&mut ByteBuffer<ChannelSink>> {
        let name = &self.name;
        self.byte_buffer
            .as_mut()
            .ok_or_else(|| anyhow!("{} is not built", name).into())
    }

    /// Buffer every frame of the batch, then hand the buffer to the channel.
    pub fn write(&mut self, emit_buffer: &[Bytes]) -> Result<()> {
        let byte_buffer = self.byte_buffer()?;
        for frame in emit_buffer {
            byte_buffer.write(frame.as_ref())?;
        }
        byte_buffer.send_buffer_and_reset()
    }

    pub fn check_buffer_timeout(&mut self) -> Result<()> {
        match self.byte_buffer.as_mut() {
            Some(byte_buffer) => byte_buffer.check_timeout().map(|_| ()),
            None => Ok(()),
        }
    }

    /// Flush and drop the producer end of the channel.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut byte_buffer) = self.byte_buffer.take() {
            byte_buffer.send_buffer_and_reset()?;
            debug!("{} closed after {} flushes", self.name, byte_buffer.flush_count());
        }
        Ok(())
    }
}

impl Default for BufferedEmit {
    fn default() -> Self {
        BufferedEmit::new()
    }
}

impl Function for BufferedEmit {
    fn get_name(&self) -> &str {
        self.name.as_str()
    }
}
