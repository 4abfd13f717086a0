use serde_json::{Map, Value};

use crate::api::error::Result;
use crate::api::function::{FilterFunction, FlattenFunction, Function, MapFunction};

/// Splits string records on a separator.
pub struct StringFlatten {
    separator: String,
}

impl StringFlatten {
    pub fn new(separator: &str) -> Self {
        StringFlatten {
            separator: separator.to_string(),
        }
    }
}

impl Function for StringFlatten {
    fn get_name(&self) -> &str {
        "StringFlatten"
    }
}

impl FlattenFunction for StringFlatten {
    fn flatten(&mut self, value: Value) -> Result<Vec<Value>> {
        match value {
            Value::String(s) => Ok(s
                .split(self.separator.as_str())
                .map(|x| Value::String(x.to_string()))
                .collect()),
            v => Ok(vec![v]),
        }
    }
}

/// Parses a JSON text record into a value.
#[derive(Default)]
pub struct JsonToObject;

impl JsonToObject {
    pub fn new() -> Self {
        JsonToObject
    }
}

impl Function for JsonToObject {
    fn get_name(&self) -> &str {
        "JsonToObject"
    }
}

impl MapFunction for JsonToObject {
    fn map(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::String(s) => Ok(serde_json::from_str(s.as_str())?),
            v => Ok(v),
        }
    }
}

/// Renders a value as JSON text.
#[derive(Default)]
pub struct ObjectToJson;

impl ObjectToJson {
    pub fn new() -> Self {
        ObjectToJson
    }
}

impl Function for ObjectToJson {
    fn get_name(&self) -> &str {
        "ObjectToJson"
    }
}

impl MapFunction for ObjectToJson {
    fn map(&mut self, value: Value) -> Result<Value> {
        Ok(Value::String(serde_json::to_string(&value)?))
    }
}

/// Like `JsonToObject`, but drops records that are not valid JSON.
#[derive(Default)]
pub struct RobustJsonToObject {
    dropped: u64,
}

impl RobustJsonToObject {
    pub fn new() -> Self {
        RobustJsonToObject::default()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Function for RobustJsonToObject {
    fn get_name(&self) -> &str {
        "RobustJsonToObject"
    }
}

impl FilterFunction for RobustJsonToObject {
    fn filter(&mut self, value: Value) -> Result<Option<Value>> {
        let s = match value {
            Value::String(s) => s,
            v => return Ok(Some(v)),
        };

        match serde_json::from_str(s.as_str()) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                self.dropped += 1;
                debug!("drop malformed record. {}", e);
                Ok(None)
            }
        }
    }
}

/// Keeps records whose `key` field satisfies the predicate. Records without
/// the field are dropped.
pub struct KeyedFilter {
    key: String,
    predicate: Box<dyn FnMut(&Value) -> bool + Send>,
}

impl KeyedFilter {
    pub fn new<F>(key: &str, predicate: F) -> Self
    where
        F: FnMut(&Value) -> bool + Send + 'static,
    {
        KeyedFilter {
            key: key.to_string(),
            predicate: Box::new(predicate),
        }
    }
}

impl Function for KeyedFilter {
    fn get_name(&self) -> &str {
        "KeyedFilter"
    }
}

impl FilterFunction for KeyedFilter {
    fn filter(&mut self, value: Value) -> Result<Option<Value>> {
        let keep = match value.get(self.key.as_str()) {
            Some(field) => (self.predicate)(field),
            None => false,
        };
        Ok(if keep { Some(value) } else { None })
    }
}

/// Projects object records onto `keys`. A missing key is an error.
pub struct KeyedSelect {
    keys: Vec<String>,
}

impl KeyedSelect {
    pub fn new<S: ToString>(keys: &[S]) -> Self {
        KeyedSelect {
            keys: keys.iter().map(|x| x.to_string()).collect(),
        }
    }
}

impl Function for KeyedSelect {
    fn get_name(&self) -> &str {
        "KeyedSelect"
    }
}

impl MapFunction for KeyedSelect {
    fn map(&mut self, value: Value) -> Result<Value> {
        let mut selected = Map::with_capacity(self.keys.len());
        for key in &self.keys {
            let field = value
                .get(key.as_str())
                .ok_or_else(|| anyhow!("field `{}` not found in record {}", key, value))?;
            selected.insert(key.clone(), field.clone());
        }
        Ok(Value::Object(selected))
    }
}

/// A named closure map.
pub struct MapFn {
    name: String,
    f: Box<dyn FnMut(Value) -> Result<Value> + Send>,
}

impl MapFn {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: FnMut(Value) -> Result<Value> + Send + 'static,
    {
        MapFn {
            name: name.to_string(),
            f: Box::new(f),
        }
    }
}

impl Function for MapFn {
    fn get_name(&self) -> &str {
        self.name.as_str()
    }
}

impl MapFunction for MapFn {
    fn map(&mut self, value: Value) -> Result<Value> {
        (self.f)(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::api::function::{FilterFunction, FlattenFunction, MapFunction};
    use crate::functions::process::{
        JsonToObject, KeyedFilter, KeyedSelect, MapFn, ObjectToJson, RobustJsonToObject,
        StringFlatten,
    };

    #[test]
    pub fn string_flatten_test() {
        let mut flatten = StringFlatten::new(" ");
        assert_eq!(
            flatten.flatten(json!("1 2 3")).unwrap(),
            vec![json!("1"), json!("2"), json!("3")]
        );
        assert_eq!(flatten.flatten(json!(7)).unwrap(), vec![json!(7)]);
    }

    #[test]
    pub fn json_round_test() {
        let mut parse = JsonToObject::new();
        let value = parse.map(json!(r#"{"actor_id":201}"#)).unwrap();
        assert_eq!(value["actor_id"], json!(201));
        assert!(parse.map(json!("{broken")).is_err());

        let mut render = ObjectToJson::new();
        assert_eq!(render.map(value).unwrap(), json!(r#"{"actor_id":201}"#));
    }

    #[test]
    pub fn robust_json_test() {
        let mut parse = RobustJsonToObject::new();
        assert!(parse.filter(json!("{broken")).unwrap().is_none());
        assert_eq!(parse.filter(json!("[1]")).unwrap(), Some(json!([1])));
        assert_eq!(parse.dropped(), 1);
    }

    #[test]
    pub fn keyed_filter_test() {
        let mut filter = KeyedFilter::new("actor_id", |v: &Value| {
            v.as_i64().map(|id| id > 205).unwrap_or(false)
        });
        assert!(filter.filter(json!({"actor_id": 205})).unwrap().is_none());
        assert!(filter.filter(json!({"actor_id": 206})).unwrap().is_some());
        assert!(filter.filter(json!({"name": "x"})).unwrap().is_none());

        let mut upper = MapFn::new("upper", |v: Value| {
            Ok(json!(v.as_str().unwrap_or_default().to_uppercase()))
        });
        assert_eq!(upper.map(json!("a")).unwrap(), json!("A"));
    }

    #[test]
    pub fn keyed_select_test() {
        let mut select = KeyedSelect::new(&["id", "t"]);
        assert_eq!(
            select
                .map(json!({"id": 1, "t": 20, "name": "a"}))
                .unwrap(),
            json!({"id": 1, "t": 20})
        );
        assert!(select.map(json!({"id": 2})).is_err());
        assert!(select.map(json!("id")).is_err());
    }
}
