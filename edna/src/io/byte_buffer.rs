use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::api::error::Result;
use crate::api::runtime::ChannelAddress;
use crate::channel::sender::ChannelSender;
use crate::io::TransportError;

/// Destination of a flushed buffer.
pub trait BufferSink {
    fn send(&mut self, buffer: Bytes) -> Result<()>;
}

/// Producer end of an inter-task channel.
#[derive(Debug)]
pub struct ChannelSink {
    address: ChannelAddress,
    sender: ChannelSender<Bytes>,
}

impl ChannelSink {
    pub fn new(address: ChannelAddress, sender: ChannelSender<Bytes>) -> Self {
        ChannelSink { address, sender }
    }
}

impl BufferSink for ChannelSink {
    fn send(&mut self, buffer: Bytes) -> Result<()> {
        self.sender
            .send(buffer)
            .map_err(|_| TransportError::Disconnected(self.address).into())
    }
}

/// Accumulates bytes and hands them to the sink once `max_buffer_size` bytes
/// are collected or the buffer is older than `max_buffer_timeout`.
///
/// A record larger than the free space is split: the fitting prefix completes
/// the current buffer, the rest starts the next one.
pub struct ByteBuffer<S> {
    sink: S,
    buffer: BytesMut,
    max_buffer_size: usize,
    max_buffer_timeout: Duration,
    start_time: Instant,
    flush_count: u64,
}

impl<S> ByteBuffer<S>
where
    S: BufferSink,
{
    pub fn new(sink: S, max_buffer_size: usize, max_buffer_timeout: Duration) -> Self {
        let max_buffer_size = max_buffer_size.max(1);
        ByteBuffer {
            sink,
            buffer: BytesMut::with_capacity(max_buffer_size),
            max_buffer_size,
            max_buffer_timeout,
            start_time: Instant::now(),
            flush_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Bytes of `record_len` that do not fit into the current buffer; negative
    /// when the record fits with room to spare.
    fn overflow(&self, record_len: usize) -> i64 {
        self.buffer.len() as i64 + record_len as i64 - self.max_buffer_size as i64
    }

    pub fn write(&mut self, record: &[u8]) -> Result<()> {
        let mut stragglers = record;
        loop {
            let overflow = self.overflow(stragglers.len());
            if overflow < 0 {
                self.buffer.extend_from_slice(stragglers);
                return Ok(());
            }

            let write_len = stragglers.len() - overflow as usize;
            self.buffer.extend_from_slice(&stragglers[..write_len]);
            // exactly full
            self.send_buffer_and_reset()?;

            stragglers = &stragglers[write_len..];
            if stragglers.is_empty() {
                return Ok(());
            }
        }
    }

    /// Send the buffered bytes, if any, and restart the timeout clock.
    pub fn send_buffer_and_reset(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            let data = self.buffer.split().freeze();
            self.sink.send(data)?;
            self.flush_count += 1;
        }
        self.start_time = Instant::now();
        Ok(())
    }

    /// Flush a partially filled buffer that is older than the timeout.
    pub fn check_timeout(&mut self) -> Result<bool> {
        if self.start_time.elapsed() > self.max_buffer_timeout {
            self.send_buffer_and_reset()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use crate::api::error::Result;
    use crate::io::byte_buffer::{BufferSink, ByteBuffer};

    #[derive(Default)]
    struct VecSink(Vec<Bytes>);

    impl BufferSink for VecSink {
        fn send(&mut self, buffer: Bytes) -> Result<()> {
            self.0.push(buffer);
            Ok(())
        }
    }

    #[test]
    pub fn oversized_record_split_test() {
        let max = 16;
        let k = 5;
        let record: Vec<u8> = (0..(max + k) as u8).collect();

        let mut buffer = ByteBuffer::new(VecSink::default(), max, Duration::from_secs(60));
        buffer.write(record.as_slice()).unwrap();
        assert_eq!(buffer.flush_count(), 1);
        assert_eq!(buffer.len(), k);

        buffer.send_buffer_and_reset().unwrap();
        assert_eq!(buffer.flush_count(), 2);

        let flushes = &buffer.sink().0;
        assert_eq!(flushes.len(), 2);
        assert_eq!(flushes[0].len(), max);
        let concatenated: Vec<u8> = flushes.iter().flat_map(|x| x.to_vec()).collect();
        assert_eq!(concatenated, record);
    }

    #[test]
    pub fn record_many_times_buffer_size_test() {
        let record = vec![7u8; 35];
        let mut buffer = ByteBuffer::new(VecSink::default(), 10, Duration::from_secs(60));
        buffer.write(b"abc").unwrap();
        buffer.write(record.as_slice()).unwrap();

        // 38 bytes: three full buffers and 8 stragglers
        assert_eq!(buffer.flush_count(), 3);
        assert_eq!(buffer.len(), 8);
        assert!(buffer.sink().0.iter().all(|x| x.len() == 10));
        assert_eq!(buffer.sink().0[0].as_ref(), b"abc\x07\x07\x07\x07\x07\x07\x07");
    }

    #[test]
    pub fn exact_fill_flush_test() {
        let mut buffer = ByteBuffer::new(VecSink::default(), 8, Duration::from_secs(60));
        buffer.write(b"1234").unwrap();
        assert_eq!(buffer.flush_count(), 0);
        buffer.write(b"5678").unwrap();
        assert_eq!(buffer.flush_count(), 1);
        assert!(buffer.is_empty());

        // nothing to send
        buffer.send_buffer_and_reset().unwrap();
        assert_eq!(buffer.flush_count(), 1);
    }

    #[test]
    pub fn timeout_flush_test() {
        let mut buffer = ByteBuffer::new(VecSink::default(), 1024, Duration::from_millis(20));
        buffer.write(b"slow").unwrap();
        assert!(!buffer.check_timeout().unwrap());

        std::thread::sleep(Duration::from_millis(30));
        assert!(buffer.check_timeout().unwrap());
        assert_eq!(buffer.sink().0, vec![Bytes::from_static(b"slow")]);

        // the clock restarted with the flush
        buffer.write(b"again").unwrap();
        assert!(!buffer.check_timeout().unwrap());
        assert_eq!(buffer.len(), 5);
    }
}
