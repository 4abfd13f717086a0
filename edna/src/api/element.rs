use std::collections::vec_deque;
use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::api::error::Result;
use crate::utils::date_time::current_timestamp_millis;

const SER_DE_RECORD: u8 = 1;
const SER_DE_CHECKPOINT: u8 = 2;
const SER_DE_WATERMARK: u8 = 3;
const SER_DE_SHUTDOWN: u8 = 4;

/// Tag byte + event timestamp
const HEADER_LEN: usize = 9;

pub(crate) trait Serde: Sized {
    fn capacity(&self) -> usize;
    fn to_bytes(&self) -> Result<Bytes> {
        let mut data = BytesMut::with_capacity(self.capacity());
        self.serialize(&mut data)?;
        Ok(data.freeze())
    }
    fn serialize(&self, bytes: &mut BytesMut) -> Result<()>;
    fn deserialize(bytes: &mut BytesMut) -> Result<Self>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub(crate) timestamp: u64,
    pub(crate) value: Value,
}

impl Record {
    pub fn new(value: Value) -> Self {
        Record {
            timestamp: current_timestamp_millis(),
            value,
        }
    }

    pub fn with_timestamp(value: Value, timestamp: u64) -> Self {
        Record { timestamp, value }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Watermark {
    pub(crate) timestamp: u64,
}

impl Watermark {
    pub fn new() -> Self {
        Watermark {
            timestamp: current_timestamp_millis(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// A state snapshot request. Forwarded downstream, not acted upon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub(crate) timestamp: u64,
}

impl Checkpoint {
    pub fn new() -> Self {
        Checkpoint {
            timestamp: current_timestamp_millis(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// End of stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shutdown {
    pub(crate) timestamp: u64,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown {
            timestamp: current_timestamp_millis(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamElement {
    Record(Record),
    Watermark(Watermark),
    Checkpoint(Checkpoint),
    Shutdown(Shutdown),
}

impl StreamElement {
    pub fn record(value: Value) -> Self {
        StreamElement::Record(Record::new(value))
    }

    pub fn watermark() -> Self {
        StreamElement::Watermark(Watermark::new())
    }

    pub fn checkpoint() -> Self {
        StreamElement::Checkpoint(Checkpoint::new())
    }

    pub fn shutdown() -> Self {
        StreamElement::Shutdown(Shutdown::new())
    }

    pub fn event_time(&self) -> u64 {
        match self {
            StreamElement::Record(record) => record.timestamp,
            StreamElement::Watermark(watermark) => watermark.timestamp,
            StreamElement::Checkpoint(checkpoint) => checkpoint.timestamp,
            StreamElement::Shutdown(shutdown) => shutdown.timestamp,
        }
    }

    #[inline]
    pub fn is_record(&self) -> bool {
        match self {
            StreamElement::Record(_) => true,
            _ => false,
        }
    }

    #[inline]
    pub fn is_watermark(&self) -> bool {
        match self {
            StreamElement::Watermark(_) => true,
            _ => false,
        }
    }

    #[inline]
    pub fn is_checkpoint(&self) -> bool {
        match self {
            StreamElement::Checkpoint(_) => true,
            _ => false,
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        match self {
            StreamElement::Shutdown(_) => true,
            _ => false,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            StreamElement::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            StreamElement::Record(record) => Some(record),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            StreamElement::Record(_) => SER_DE_RECORD,
            StreamElement::Checkpoint(_) => SER_DE_CHECKPOINT,
            StreamElement::Watermark(_) => SER_DE_WATERMARK,
            StreamElement::Shutdown(_) => SER_DE_SHUTDOWN,
        }
    }
}

impl From<Record> for StreamElement {
    fn from(record: Record) -> Self {
        StreamElement::Record(record)
    }
}

impl From<Watermark> for StreamElement {
    fn from(watermark: Watermark) -> Self {
        StreamElement::Watermark(watermark)
    }
}

impl From<Checkpoint> for StreamElement {
    fn from(checkpoint: Checkpoint) -> Self {
        StreamElement::Checkpoint(checkpoint)
    }
}

impl From<Shutdown> for StreamElement {
    fn from(shutdown: Shutdown) -> Self {
        StreamElement::Shutdown(shutdown)
    }
}

impl Serde for StreamElement {
    fn capacity(&self) -> usize {
        match self {
            // payload size is unknown until encoded
            StreamElement::Record(_) => HEADER_LEN + 64,
            _ => HEADER_LEN,
        }
    }

    fn serialize(&self, bytes: &mut BytesMut) -> Result<()> {
        bytes.put_u8(self.tag());
        bytes.put_u64(self.event_time());
        if let StreamElement::Record(record) = self {
            let payload = serde_json::to_vec(&record.value)?;
            bytes.put_slice(payload.as_slice());
        }
        Ok(())
    }

    fn deserialize(bytes: &mut BytesMut) -> Result<Self> {
        if bytes.remaining() < HEADER_LEN {
            return Err(anyhow!("element frame too short, {} bytes", bytes.remaining()).into());
        }

        let flag = bytes.get_u8();
        let timestamp = bytes.get_u64();
        let element = match flag {
            SER_DE_RECORD => {
                let value: Value = serde_json::from_slice(bytes.as_ref())?;
                bytes.advance(bytes.remaining());
                StreamElement::Record(Record { timestamp, value })
            }
            SER_DE_CHECKPOINT => StreamElement::Checkpoint(Checkpoint { timestamp }),
            SER_DE_WATERMARK => StreamElement::Watermark(Watermark { timestamp }),
            SER_DE_SHUTDOWN => StreamElement::Shutdown(Shutdown { timestamp }),
            _ => return Err(anyhow!("unknown element type {}", flag).into()),
        };
        Ok(element)
    }
}

/// Ordered batch of elements: appended at the tail, consumed at the head.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordCollection {
    elements: VecDeque<StreamElement>,
}

impl RecordCollection {
    pub fn new() -> Self {
        RecordCollection {
            elements: VecDeque::new(),
        }
    }

    pub fn singleton<E: Into<StreamElement>>(element: E) -> Self {
        let mut collection = RecordCollection::new();
        collection.push(element.into());
        collection
    }

    pub fn push(&mut self, element: StreamElement) {
        self.elements.push_back(element);
    }

    pub fn pop(&mut self) -> Option<StreamElement> {
        self.elements.pop_front()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, StreamElement> {
        self.elements.iter()
    }

    pub fn contains_shutdown(&self) -> bool {
        self.elements.iter().any(|x| x.is_shutdown())
    }
}

impl Extend<StreamElement> for RecordCollection {
    fn extend<T: IntoIterator<Item = StreamElement>>(&mut self, iter: T) {
        self.elements.extend(iter)
    }
}

impl FromIterator<StreamElement> for RecordCollection {
    fn from_iter<T: IntoIterator<Item = StreamElement>>(iter: T) -> Self {
        RecordCollection {
            elements: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<StreamElement>> for RecordCollection {
    fn from(elements: Vec<StreamElement>) -> Self {
        RecordCollection {
            elements: elements.into(),
        }
    }
}

impl IntoIterator for RecordCollection {
    type Item = StreamElement;
    type IntoIter = vec_deque::IntoIter<StreamElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}
