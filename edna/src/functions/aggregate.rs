use serde_json::{json, Map, Number, Value};

use crate::api::error::Result;
use crate::api::function::{AggregateFunction, Function};

/// Counts records.
#[derive(Default)]
pub struct RecordCount {
    count: u64,
}

impl RecordCount {
    pub fn new() -> Self {
        RecordCount::default()
    }
}

impl Function for RecordCount {
    fn get_name(&self) -> &str {
        "RecordCount"
    }
}

impl AggregateFunction for RecordCount {
    fn aggregate(&mut self, _value: &Value) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn triggered_emit(&self) -> Vec<Value> {
        vec![json!(self.count)]
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Sum {
    Int(i64),
    Float(f64),
}

impl Sum {
    fn add(self, number: &Number) -> Sum {
        match (self, number.as_i64()) {
            (Sum::Int(a), Some(b)) => match a.checked_add(b) {
                Some(v) => Sum::Int(v),
                None => Sum::Float(a as f64 + b as f64),
            },
            (Sum::Int(a), None) => Sum::Float(a as f64 + number.as_f64().unwrap_or_default()),
            (Sum::Float(a), _) => Sum::Float(a + number.as_f64().unwrap_or_default()),
        }
    }

    fn to_value(self) -> Value {
        match self {
            Sum::Int(v) => json!(v),
            Sum::Float(v) => json!(v),
        }
    }
}

/// Sums the numeric `key` field of object records, emitting `{key: sum}`.
///
/// The sum stays integral until a float is seen.
pub struct KeyedSum {
    key: String,
    sum: Sum,
}

impl KeyedSum {
    pub fn new(key: &str) -> Self {
        KeyedSum {
            key: key.to_string(),
            sum: Sum::Int(0),
        }
    }
}

impl Function for KeyedSum {
    fn get_name(&self) -> &str {
        "KeyedSum"
    }
}

impl AggregateFunction for KeyedSum {
    fn aggregate(&mut self, value: &Value) -> Result<()> {
        match value.get(self.key.as_str()) {
            Some(Value::Number(n)) => {
                self.sum = self.sum.add(n);
                Ok(())
            }
            Some(v) => Err(anyhow!("field `{}` is not a number: {}", self.key, v).into()),
            None => Err(anyhow!("field `{}` not found in record {}", self.key, value).into()),
        }
    }

    fn triggered_emit(&self) -> Vec<Value> {
        let mut object = Map::new();
        object.insert(self.key.clone(), self.sum.to_value());
        vec![Value::Object(object)]
    }

    fn reset(&mut self) {
        self.sum = Sum::Int(0);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Extreme {
    Max,
    Min,
}

struct KeyedExtreme {
    key: String,
    extreme: Extreme,
    current: Option<(f64, Value)>,
}

impl KeyedExtreme {
    fn new(key: &str, extreme: Extreme) -> Self {
        KeyedExtreme {
            key: key.to_string(),
            extreme,
            current: None,
        }
    }

    fn aggregate(&mut self, value: &Value) -> Result<()> {
        let n = value
            .get(self.key.as_str())
            .and_then(|x| x.as_f64())
            .ok_or_else(|| anyhow!("numeric field `{}` not found in record {}", self.key, value))?;

        let replace = match &self.current {
            None => true,
            Some((c, _)) => match self.extreme {
                Extreme::Max => n > *c,
                Extreme::Min => n < *c,
            },
        };
        if replace {
            self.current = Some((n, value.clone()));
        }
        Ok(())
    }

    /// The `key` field of the extreme record.
    fn extreme_value(&self) -> Vec<Value> {
        self.current
            .iter()
            .filter_map(|(_, v)| v.get(self.key.as_str()).cloned())
            .collect()
    }

    fn extreme_record(&self) -> Vec<Value> {
        self.current.iter().map(|(_, v)| v.clone()).collect()
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

macro_rules! keyed_extreme {
    ($(#[$doc:meta])* $name:ident, $extreme:expr, $emit:ident) => {
        $(#[$doc])*
        pub struct $name {
            inner: KeyedExtreme,
        }

        impl $name {
            pub fn new(key: &str) -> Self {
                $name {
                    inner: KeyedExtreme::new(key, $extreme),
                }
            }
        }

        impl Function for $name {
            fn get_name(&self) -> &str {
                stringify!($name)
            }
        }

        impl AggregateFunction for $name {
            fn aggregate(&mut self, value: &Value) -> Result<()> {
                self.inner.aggregate(value)
            }

            fn triggered_emit(&self) -> Vec<Value> {
                self.inner.$emit()
            }

            fn reset(&mut self) {
                self.inner.reset()
            }
        }
    };
}

keyed_extreme!(
    /// Largest value of the numeric `key` field.
    KeyedMax,
    Extreme::Max,
    extreme_value
);

keyed_extreme!(
    /// Smallest value of the numeric `key` field.
    KeyedMin,
    Extreme::Min,
    extreme_value
);

keyed_extreme!(
    /// The record with the largest `key` field. Ties keep the earliest.
    KeyedMaxBy,
    Extreme::Max,
    extreme_record
);

keyed_extreme!(
    /// The record with the smallest `key` field. Ties keep the earliest.
    KeyedMinBy,
    Extreme::Min,
    extreme_record
);
