use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use metrics::{counter, gauge};

#[derive(Clone, Debug)]
pub struct Tag(String, String);

impl Tag {
    pub fn new<F, C>(field: F, context: C) -> Self
    where
        F: ToString,
        C: ToString,
    {
        Tag(field.to_string(), context.to_string())
    }
}

struct CounterMeta {
    name: String,
    tags: Vec<Tag>,
    old_value: AtomicU64,
    value: Arc<AtomicU64>,
}

struct GaugeMeta {
    name: String,
    tags: Vec<Tag>,
    value: Arc<AtomicI64>,
}

lazy_static! {
    static ref COUNTER: RwLock<Vec<CounterMeta>> = RwLock::new(Vec::new());
    static ref GAUGE: RwLock<Vec<GaugeMeta>> = RwLock::new(Vec::new());
}

#[derive(Clone, Default, Debug)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    fn new(value: Arc<AtomicU64>) -> Self {
        Counter { value }
    }

    pub fn fetch_add(&self, v: u64) -> u64 {
        self.value.fetch_add(v, Ordering::Relaxed)
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Default, Debug)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    fn new(value: Arc<AtomicI64>) -> Self {
        Gauge { value }
    }

    pub fn store(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn fetch_add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn fetch_sub(&self, v: i64) {
        self.value.fetch_sub(v, Ordering::Relaxed);
    }

    pub fn load(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub fn register_counter<K>(name: K, tags: Vec<Tag>) -> Counter
where
    K: ToString,
{
    let value = Arc::new(AtomicU64::new(0));
    let meta = CounterMeta {
        name: name.to_string(),
        tags,
        old_value: AtomicU64::new(0),
        value: value.clone(),
    };

    let metrics: &RwLock<Vec<CounterMeta>> = &*COUNTER;
    match metrics.write() {
        Ok(mut n) => (*n).push(meta),
        Err(e) => warn!("counter registry poisoned, {} not published. {}", meta.name, e),
    }

    Counter::new(value)
}

pub fn register_gauge<K>(name: K, tags: Vec<Tag>) -> Gauge
where
    K: ToString,
{
    let value = Arc::new(AtomicI64::new(0));
    let meta = GaugeMeta {
        name: name.to_string(),
        tags,
        value: value.clone(),
    };

    let metrics: &RwLock<Vec<GaugeMeta>> = &*GAUGE;
    match metrics.write() {
        Ok(mut n) => (*n).push(meta),
        Err(e) => warn!("gauge registry poisoned, {} not published. {}", meta.name, e),
    }

    Gauge::new(value)
}

/// Push every registered value to the installed `metrics` recorder.
pub fn compute() {
    compute_counter();
    compute_gauge();
}

fn labels(tags: &[Tag]) -> Vec<(String, String)> {
    tags.iter().map(|tag| (tag.0.clone(), tag.1.clone())).collect()
}

fn compute_counter() {
    let metrics: &RwLock<Vec<CounterMeta>> = &*COUNTER;
    let metrics = match metrics.read() {
        Ok(metrics) => metrics,
        Err(_) => return,
    };
    for meta in &*metrics {
        let name = meta.name.clone();

        let value: u64 = meta.value.load(Ordering::Relaxed);
        let old_value: u64 = meta.old_value.load(Ordering::Relaxed);
        let incr = value - old_value;
        meta.old_value.store(value, Ordering::Relaxed);

        let labels = labels(&meta.tags);
        counter!(name, incr, &labels);
    }
}

fn compute_gauge() {
    let metrics: &RwLock<Vec<GaugeMeta>> = &*GAUGE;
    let metrics = match metrics.read() {
        Ok(metrics) => metrics,
        Err(_) => return,
    };
    for meta in &*metrics {
        let name = meta.name.clone();

        let labels = labels(&meta.tags);
        let val = meta.value.load(Ordering::Relaxed) as f64;
        gauge!(name, val, &labels);
    }
}
