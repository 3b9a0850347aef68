use {
    std::{collections::HashMap, path::Path, time::Duration},
    tokio::{fs, io},
    serde::Deserialize,
    thiserror::Error,
    tracing::Level,
};

const DEFAULT_SERVICE_ADDRESS: &str = "127.0.0.1:50051";
const DEFAULT_CHILD_ADDRESS: &str = "localhost:8080";
const DEFAULT_GATEWAY_ADDRESS: &str = "0.0.0.0:9001";
const DEFAULT_CHILD_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_WORKER_TIMEOUT_SECONDS: u64 = 10;

#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct MembraneConfig {
    /// Address workers connect to.
    pub service_address: String,

    pub child_address: String,
    pub child_command: Option<String>,
    pub child_timeout_seconds: u64,
    pub child_logs: ChildLogs,

    pub max_workers: usize,
    pub worker_timeout_seconds: u64,
    pub wait_for_worker: bool,

    pub gateway: GatewayConfig,

    /// User facing topic name -> provider topic id.
    pub topics: HashMap<String, String>,

    pub metrics_port: Option<u16>,
    pub log_level: LogLevel,
}

impl Default for MembraneConfig {
    fn default() -> Self {
        Self {
            service_address: DEFAULT_SERVICE_ADDRESS.to_owned(),
            child_address: DEFAULT_CHILD_ADDRESS.to_owned(),
            child_command: None,
            child_timeout_seconds: DEFAULT_CHILD_TIMEOUT_SECONDS,
            child_logs: ChildLogs::Inherit,
            max_workers: 1,
            worker_timeout_seconds: DEFAULT_WORKER_TIMEOUT_SECONDS,
            wait_for_worker: true,
            gateway: GatewayConfig::default(),
            topics: HashMap::new(),
            metrics_port: None,
            log_level: LogLevel::Info,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChildLogs {
    #[serde(rename = "inherit")]
    Inherit,
    #[serde(rename = "capture")]
    Capture,
}

#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum GatewayConfig {
    #[serde(rename = "lambda")]
    Lambda {
        /// Defaults to `AWS_LAMBDA_RUNTIME_API`.
        runtime_api: Option<String>,
    },
    #[serde(rename = "http")]
    Http {
        address: String,
    },
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::Http { address: DEFAULT_GATEWAY_ADDRESS.to_owned() }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0:?}")]
    FailedToRead(io::Error),

    #[error("failed to parse config: {0}")]
    FailedToParse(serde_yml::Error),

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

impl MembraneConfig {
    pub async fn load(file_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(file_path).await.map_err(ConfigError::FailedToRead)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(contents).map_err(ConfigError::FailedToParse)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid { reason: "max_workers must be at least 1".to_owned() });
        }
        if self.child_timeout_seconds == 0 {
            return Err(ConfigError::Invalid { reason: "child_timeout_seconds must be positive".to_owned() });
        }
        if self.child_command.as_ref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ConfigError::Invalid { reason: "child_command must not be empty when set".to_owned() });
        }
        Ok(())
    }

    pub fn child_timeout(&self) -> Duration {
        Duration::from_secs(self.child_timeout_seconds)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_seconds)
    }
}
