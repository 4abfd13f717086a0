use bytes::Bytes;
use serde_json::Value;

use crate::api::element::StreamElement;
use crate::api::error::Result;

/// Converts between raw connector bytes and record values.
pub trait Serializer: Send + Sync {
    fn read(&self, in_stream: &[u8]) -> Result<Value>;
    fn write(&self, out_stream: &Value) -> Result<Bytes>;
}

/// Stream oriented codec used between tasks.
///
/// `feed` may receive any slice of the byte stream, including partial frames;
/// `next` yields complete elements in FIFO order and `None` once the buffered
/// bytes hold no complete frame.
pub trait BufferedSerializer: Send {
    fn write(&mut self, element: &StreamElement) -> Result<Bytes>;
    fn feed(&mut self, buffered_message: &[u8]);
    fn next(&mut self) -> Result<Option<StreamElement>>;
}

/// UTF-8 text. Non-string values are written as their JSON text.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    fn read(&self, in_stream: &[u8]) -> Result<Value> {
        let s = std::str::from_utf8(in_stream).map_err(|e| anyhow!(e))?;
        Ok(Value::String(s.to_string()))
    }

    fn write(&self, out_stream: &Value) -> Result<Bytes> {
        match out_stream {
            Value::String(s) => Ok(Bytes::from(s.clone())),
            v => Ok(Bytes::from(v.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn read(&self, in_stream: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(in_stream)?)
    }

    fn write(&self, out_stream: &Value) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(out_stream)?))
    }
}

pub(crate) static STRING_SERIALIZER: StringSerializer = StringSerializer;
