use std::time::{Duration, Instant};

use serde_json::Value;

use crate::api::function::Trigger;

/// Fires on every `n`th record.
pub struct CountTrigger {
    n: u64,
    seen: u64,
}

impl CountTrigger {
    /// `n` of zero is treated as one.
    pub fn new(n: u64) -> Self {
        CountTrigger { n: n.max(1), seen: 0 }
    }
}

impl Trigger for CountTrigger {
    fn check(&mut self, _value: &Value) -> bool {
        self.seen += 1;
        if self.seen >= self.n {
            self.seen = 0;
            true
        } else {
            false
        }
    }
}

/// Fires when the `key` field of a record satisfies the predicate.
pub struct KeyedTrigger {
    key: String,
    predicate: Box<dyn FnMut(&Value) -> bool + Send>,
}

impl KeyedTrigger {
    pub fn new<F>(key: &str, predicate: F) -> Self
    where
        F: FnMut(&Value) -> bool + Send + 'static,
    {
        KeyedTrigger {
            key: key.to_string(),
            predicate: Box::new(predicate),
        }
    }
}

impl Trigger for KeyedTrigger {
    fn check(&mut self, value: &Value) -> bool {
        match value.get(self.key.as_str()) {
            Some(field) => (self.predicate)(field),
            None => false,
        }
    }
}

/// Fires on the first record arriving after each interval elapses.
pub struct TimedTrigger {
    interval: Duration,
    last_fire: Instant,
}

impl TimedTrigger {
    pub fn new(interval: Duration) -> Self {
        TimedTrigger {
            interval,
            last_fire: Instant::now(),
        }
    }
}

impl Trigger for TimedTrigger {
    fn check(&mut self, _value: &Value) -> bool {
        if self.last_fire.elapsed() >= self.interval {
            self.last_fire = Instant::now();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::api::function::Trigger;
    use crate::functions::trigger::{CountTrigger, KeyedTrigger, TimedTrigger};

    #[test]
    pub fn count_trigger_test() {
        let mut trigger = CountTrigger::new(3);
        let fired: Vec<bool> = (0..6).map(|x| trigger.check(&json!(x))).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);

        let mut every = CountTrigger::new(0);
        assert!(every.check(&json!(1)));
    }

    #[test]
    pub fn keyed_trigger_test() {
        let mut trigger = KeyedTrigger::new("end", |v: &Value| v.as_bool().unwrap_or(false));
        assert!(!trigger.check(&json!({"v": 1})));
        assert!(!trigger.check(&json!({"end": false})));
        assert!(trigger.check(&json!({"end": true})));
    }

    #[test]
    pub fn timed_trigger_test() {
        let mut trigger = TimedTrigger::new(Duration::from_millis(20));
        assert!(!trigger.check(&json!(1)));
        std::thread::sleep(Duration::from_millis(30));
        assert!(trigger.check(&json!(2)));
        assert!(!trigger.check(&json!(3)));
    }
}
