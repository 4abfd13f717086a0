use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

/// Spawn a named OS thread.
pub fn spawn<F, T>(name: &str, f: F) -> std::io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new().name(name.to_string()).spawn(f)
}

/// A current-thread tokio runtime whose blocking pool is capped at one worker,
/// so work handed to `spawn_blocking` is executed strictly one item at a time.
pub fn async_runtime_single_worker(
    thread_name: &'static str,
) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .max_blocking_threads(1)
        .thread_name_fn(move || {
            static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
            let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
            format!("A-{}-{}", thread_name, id)
        })
        .build()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::utils::thread::{async_runtime_single_worker, spawn};

    #[test]
    pub fn spawn_named_test() {
        let handle = spawn("Edna-Test", || {
            std::thread::current().name().map(|x| x.to_string())
        })
        .unwrap();
        assert_eq!(handle.join().unwrap(), Some("Edna-Test".to_string()));
    }

    #[test]
    pub fn single_worker_runtime_test() {
        let rt = async_runtime_single_worker("Test").unwrap();
        let handle = rt.spawn_blocking(|| 40 + 2);
        let n = rt
            .block_on(async { tokio::time::timeout(Duration::from_secs(5), handle).await })
            .unwrap()
            .unwrap();
        assert_eq!(n, 42);
    }
}
