use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::api::element::{Serde, StreamElement};
use crate::api::error::Result;
use crate::api::serializer::BufferedSerializer;
use crate::io::TransportError;

/// Frames every element with a length prefix so a byte stream cut at
/// arbitrary points decodes back into the same elements.
pub struct LengthDelimitedSerializer {
    codec: LengthDelimitedCodec,
    buffer: BytesMut,
}

impl LengthDelimitedSerializer {
    pub fn new() -> Self {
        LengthDelimitedSerializer {
            codec: LengthDelimitedCodec::new(),
            buffer: BytesMut::new(),
        }
    }

    /// Bytes fed but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LengthDelimitedSerializer {
    fn default() -> Self {
        LengthDelimitedSerializer::new()
    }
}

impl BufferedSerializer for LengthDelimitedSerializer {
    fn write(&mut self, element: &StreamElement) -> Result<Bytes> {
        let payload = element.to_bytes()?;
        let mut frame = BytesMut::with_capacity(payload.len() + 4);
        self.codec
            .encode(payload, &mut frame)
            .map_err(|e| TransportError::Frame(e.to_string()))?;
        Ok(frame.freeze())
    }

    fn feed(&mut self, buffered_message: &[u8]) {
        self.buffer.extend_from_slice(buffered_message);
    }

    fn next(&mut self) -> Result<Option<StreamElement>> {
        let frame = self
            .codec
            .decode(&mut self.buffer)
            .map_err(|e| TransportError::Frame(e.to_string()))?;
        match frame {
            Some(mut frame) => Ok(Some(StreamElement::deserialize(&mut frame)?)),
            None => Ok(None),
        }
    }
}
