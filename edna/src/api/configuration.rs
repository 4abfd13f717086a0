//! Job configuration loaded from YAML.
//!
//! ```yaml
//! variables:
//!   topic: words
//! options:
//!   buffer_max_size: 32768
//!   log_level: info
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde_yaml::Value;

use crate::api::defaults::{
    BUFFER_MAX_SIZE, BUFFER_MAX_TIMEOUT, CHANNEL_CAPACITY, TASK_POLL_TIMEOUT, TASK_PRIMITIVE_HOST,
};

#[derive(Debug)]
pub enum ConfigurationError {
    NotFound(String),
    InvalidValue { key: String, expected: &'static str },
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ConfigurationError::NotFound(ref key) => write!(f, "configuration key {} not found", key),
            ConfigurationError::InvalidValue { ref key, expected } => {
                write!(f, "configuration key {} is not a valid {}", key, expected)
            }
            ConfigurationError::Io(ref err) => write!(f, "IO error: {}", err),
            ConfigurationError::Yaml(ref err) => write!(f, "YAML error: {}", err),
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<std::io::Error> for ConfigurationError {
    fn from(e: std::io::Error) -> Self {
        ConfigurationError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigurationError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigurationError::Yaml(e)
    }
}

#[derive(Deserialize, Debug, Default)]
struct ConfigurationFile {
    #[serde(default)]
    variables: Option<HashMap<String, Value>>,
    #[serde(default)]
    options: Option<HashMap<String, Value>>,
}

/// Job `variables` and engine `options`.
///
/// Options are also visible as variables; a variable with the same key wins.
#[derive(Clone, Debug, Default)]
pub struct StreamingConfiguration {
    variables: HashMap<String, Value>,
    options: HashMap<String, Value>,
}

impl StreamingConfiguration {
    pub fn new() -> Self {
        StreamingConfiguration::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        if yaml.trim().is_empty() {
            return Ok(StreamingConfiguration::new());
        }
        let file: Option<ConfigurationFile> = serde_yaml::from_str(yaml)?;
        let file = file.unwrap_or_default();

        let options = file.options.unwrap_or_default();
        let mut variables = options.clone();
        variables.extend(file.variables.unwrap_or_default());

        Ok(StreamingConfiguration { variables, options })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let yaml = std::fs::read_to_string(path)?;
        StreamingConfiguration::from_yaml_str(yaml.as_str())
    }

    /// Load `dir/file`, or an empty configuration when the file does not exist.
    pub fn load<P: AsRef<Path>>(dir: P, file: &str) -> Result<Self, ConfigurationError> {
        let path = dir.as_ref().join(file);
        if !path.exists() {
            warn!(
                "configuration file {} not found, use empty configuration",
                path.display()
            );
            return Ok(StreamingConfiguration::new());
        }

        info!("load configuration from {}", path.display());
        StreamingConfiguration::from_file(path)
    }

    pub fn set_variable(&mut self, key: &str, value: Value) {
        self.variables.insert(key.to_string(), value);
    }

    pub fn set_option(&mut self, key: &str, value: Value) {
        self.options.insert(key.to_string(), value.clone());
        self.variables.entry(key.to_string()).or_insert(value);
    }

    pub fn get_variable(&self, key: &str) -> Result<&Value, ConfigurationError> {
        self.variables
            .get(key)
            .ok_or_else(|| ConfigurationError::NotFound(key.to_string()))
    }

    pub fn get_option(&self, key: &str) -> Result<&Value, ConfigurationError> {
        self.options
            .get(key)
            .ok_or_else(|| ConfigurationError::NotFound(key.to_string()))
    }

    pub fn get_string(&self, key: &str) -> Result<String, ConfigurationError> {
        value_to_string(key, self.get_variable(key)?)
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, ConfigurationError> {
        value_to_u64(key, self.get_variable(key)?)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigurationError> {
        let value = self.get_variable(key)?;
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => s.parse::<bool>().map_err(|_e| invalid(key, "bool")),
            _ => Err(invalid(key, "bool")),
        }
    }
}

fn invalid(key: &str, expected: &'static str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.to_string(),
        expected,
    }
}

fn value_to_string(key: &str, value: &Value) -> Result<String, ConfigurationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(key, "string")),
    }
}

fn value_to_u64(key: &str, value: &Value) -> Result<u64, ConfigurationError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(key, "u64")),
        Value::String(s) => s.parse::<u64>().map_err(|_e| invalid(key, "u64")),
        _ => Err(invalid(key, "u64")),
    }
}

/// Engine settings read from the `options` section.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub buffer_max_size: usize,
    pub buffer_max_timeout: Duration,
    pub task_poll_timeout: Duration,
    pub channel_capacity: usize,
    pub host: String,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            buffer_max_size: BUFFER_MAX_SIZE,
            buffer_max_timeout: BUFFER_MAX_TIMEOUT,
            task_poll_timeout: TASK_POLL_TIMEOUT,
            channel_capacity: CHANNEL_CAPACITY,
            host: TASK_PRIMITIVE_HOST.to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl EngineOptions {
    pub fn from_configuration(
        configuration: &StreamingConfiguration,
    ) -> Result<Self, ConfigurationError> {
        let default = EngineOptions::default();

        let u64_option = |key: &str, default: u64| match configuration.get_option(key) {
            Ok(value) => value_to_u64(key, value),
            Err(ConfigurationError::NotFound(_)) => Ok(default),
            Err(e) => Err(e),
        };
        let string_option = |key: &str| match configuration.get_option(key) {
            Ok(value) => value_to_string(key, value).map(Some),
            Err(ConfigurationError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        };

        let buffer_max_size = u64_option("buffer_max_size", default.buffer_max_size as u64)?;
        let buffer_max_timeout = u64_option(
            "buffer_max_timeout_ms",
            default.buffer_max_timeout.as_millis() as u64,
        )?;
        let task_poll_timeout = u64_option(
            "task_poll_timeout_ms",
            default.task_poll_timeout.as_millis() as u64,
        )?;
        let channel_capacity = u64_option("channel_capacity", default.channel_capacity as u64)?;

        if buffer_max_size == 0 {
            return Err(invalid("buffer_max_size", "positive size"));
        }
        if channel_capacity == 0 {
            return Err(invalid("channel_capacity", "positive capacity"));
        }

        Ok(EngineOptions {
            buffer_max_size: buffer_max_size as usize,
            buffer_max_timeout: Duration::from_millis(buffer_max_timeout),
            task_poll_timeout: Duration::from_millis(task_poll_timeout),
            channel_capacity: channel_capacity as usize,
            host: string_option("host")?.unwrap_or(default.host),
            log_level: string_option("log_level")?.unwrap_or(default.log_level),
            log_file: string_option("log_file")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_yaml::Value;

    use crate::api::configuration::{ConfigurationError, EngineOptions, StreamingConfiguration};

    const YAML: &str = r#"
variables:
  topic: words
  batch: "12"
  host: override
options:
  buffer_max_size: 1024
  buffer_max_timeout_ms: 20
  host: 127.0.0.1
  verbose: true
"#;

    #[test]
    pub fn variables_and_options_test() {
        let conf = StreamingConfiguration::from_yaml_str(YAML).unwrap();
        assert_eq!(conf.get_string("topic").unwrap(), "words");
        assert_eq!(conf.get_u64("batch").unwrap(), 12);

        // options are visible as variables, variables win
        assert_eq!(conf.get_u64("buffer_max_size").unwrap(), 1024);
        assert!(conf.get_bool("verbose").unwrap());
        assert_eq!(conf.get_string("host").unwrap(), "override");

        assert!(matches!(
            conf.get_variable("missing"),
            Err(ConfigurationError::NotFound(_))
        ));
        assert!(matches!(
            conf.get_u64("topic"),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    pub fn empty_sections_test() {
        let conf = StreamingConfiguration::from_yaml_str("variables:\noptions: ~\n").unwrap();
        assert!(conf.get_variable("topic").is_err());

        let conf = StreamingConfiguration::from_yaml_str("").unwrap();
        assert!(conf.get_variable("topic").is_err());
    }

    #[test]
    pub fn engine_options_test() {
        let conf = StreamingConfiguration::from_yaml_str(YAML).unwrap();
        let options = EngineOptions::from_configuration(&conf).unwrap();
        assert_eq!(options.buffer_max_size, 1024);
        assert_eq!(options.buffer_max_timeout, Duration::from_millis(20));
        assert_eq!(options.task_poll_timeout, Duration::from_millis(100));
        assert_eq!(options.channel_capacity, 1024);
        // engine options read the options section only
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.log_file, None);

        let mut conf = StreamingConfiguration::new();
        conf.set_option("buffer_max_size", Value::from(0));
        assert!(EngineOptions::from_configuration(&conf).is_err());
    }

    #[test]
    pub fn load_missing_file_test() {
        let dir = std::env::temp_dir();
        let file = format!("{}.yaml", uuid::Uuid::new_v4());
        let conf = StreamingConfiguration::load(&dir, file.as_str()).unwrap();
        assert!(conf.get_variable("topic").is_err());

        std::fs::write(dir.join(&file), YAML).unwrap();
        let conf = StreamingConfiguration::load(&dir, file.as_str()).unwrap();
        assert_eq!(conf.get_string("topic").unwrap(), "words");
        std::fs::remove_file(dir.join(&file)).unwrap();
    }
}
