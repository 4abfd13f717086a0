//! Named bounded channels between task threads.

use crate::channel::receiver::ChannelReceiver;
use crate::channel::sender::ChannelSender;
use crate::metrics::{register_counter, register_gauge, Tag};

pub const CHANNEL_SIZE_PREFIX: &str = "Channel.Size.";
pub const CHANNEL_ACCEPTED_PREFIX: &str = "Channel.Accepted.";
pub const CHANNEL_DRAIN_PREFIX: &str = "Channel.Drain.";

pub type TrySendError<T> = crossbeam::channel::TrySendError<T>;
pub type SendError<T> = crossbeam::channel::SendError<T>;
pub type SendTimeoutError<T> = crossbeam::channel::SendTimeoutError<T>;
pub type TryRecvError = crossbeam::channel::TryRecvError;
pub type RecvTimeoutError = crossbeam::channel::RecvTimeoutError;

pub type Receiver<T> = crossbeam::channel::Receiver<T>;
pub type Sender<T> = crossbeam::channel::Sender<T>;

pub mod receiver;
pub mod sender;

pub fn bounded<T>(cap: usize) -> (Sender<T>, Receiver<T>) {
    crossbeam::channel::bounded(cap)
}

pub fn named_channel<T>(
    name: &str,
    tags: Vec<Tag>,
    cap: usize,
) -> (ChannelSender<T>, ChannelReceiver<T>)
where
    T: Send,
{
    info!("Create channel named with {}, capacity: {}", name, cap);

    let (sender, receiver) = bounded(cap);

    let size = register_gauge(CHANNEL_SIZE_PREFIX.to_owned() + name, tags.clone());
    let accepted_counter =
        register_counter(CHANNEL_ACCEPTED_PREFIX.to_owned() + name, tags.clone());
    let drain_counter = register_counter(CHANNEL_DRAIN_PREFIX.to_owned() + name, tags);

    (
        ChannelSender::new(name, sender, cap, size.clone(), accepted_counter),
        ChannelReceiver::new(name, receiver, size, drain_counter),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::channel::{named_channel, RecvTimeoutError};
    use crate::utils::thread::spawn;

    #[test]
    pub fn named_channel_test() {
        let (sender, receiver) = named_channel("Test", vec![], 4);

        let send_thread_handle = spawn("Test-Sender", move || {
            for n in 0..100 {
                sender.send(n).unwrap();
            }
        })
        .unwrap();

        let mut values = Vec::new();
        loop {
            match receiver.recv_timeout(Duration::from_secs(5)) {
                Ok(n) => values.push(n),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => panic!("sender stalled"),
            }
        }
        send_thread_handle.join().unwrap();

        assert_eq!(values, (0..100).collect::<Vec<i32>>());
        assert_eq!(receiver.size(), 0);
        assert_eq!(receiver.drained(), 100);
    }

    #[test]
    pub fn channel_full_test() {
        let (sender, receiver) = named_channel("Test-Full", vec![], 1);
        assert!(sender.try_send(1).is_ok());
        assert!(sender.try_send(2).is_err());
        assert!(sender.send_timeout(3, Duration::from_millis(10)).is_err());
        assert_eq!(sender.size(), 1);

        assert_eq!(receiver.try_recv().unwrap(), 1);
        assert!(receiver.try_recv().is_err());
    }
}
