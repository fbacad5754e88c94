use std::{
    fs::File,
    io::{BufReader, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::{
    name_resolver::LspciLookup,
    status_parser::ParsePolicy,
    status_reader::{CommandStatusReader, FileStatusReader, SwitcherooReader},
};

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open configuration file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

// Daemon configuration, every key is optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_ms: u64,
    pub parse_policy: ParsePolicy,

    // Command printing the switch file, used unless status_file is set
    pub status_command: Vec<String>,
    // Read the switch file directly instead of running status_command
    pub status_file: Option<PathBuf>,

    // Hardware database command, the bus ID is appended to it
    pub lookup_command: Vec<String>,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.status_file.is_none() && self.status_command.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "status_command is empty".to_string(),
            });
        }

        if self.lookup_command.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "lookup_command is empty".to_string(),
            });
        }

        Ok(())
    }

    // Build the status reader described by the configuration
    pub fn reader(&self) -> SwitcherooReader {
        match &self.status_file {
            Some(path) => SwitcherooReader::File(FileStatusReader::new(path)),
            None => SwitcherooReader::Command(CommandStatusReader::new(
                self.status_command.clone(),
            )),
        }
    }

    pub fn lookup(&self) -> LspciLookup {
        LspciLookup::new(self.lookup_command.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            parse_policy: ParsePolicy::Strict,

            status_command: CommandStatusReader::default().command().to_vec(),
            status_file: None,

            lookup_command: LspciLookup::default().command().to_vec(),
        }
    }
}

// Load the Json configuration file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
        }
    }

    // Parse the configuration file, a missing file gives
    // the default configuration
    pub fn load(&self) -> Result<Config> {
        debug!("Parsing config file at: {:?}", self.config_path);

        let file = match File::open(&self.config_path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    "No configuration file at {:?}, using defaults",
                    self.config_path
                );

                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Open {
                    path: self.config_path.clone(),
                    source,
                });
            }
        };

        let config: Config = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ConfigError::Parse {
                path: self.config_path.clone(),
                source,
            })?;

        config.validate()?;

        trace!("Current config: {:?}", config);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::status_reader::SWITCHEROO_PATH;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::new(&dir.path().join("config.json"))
            .load()
            .unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.parse_policy, ParsePolicy::Strict);
        assert_eq!(
            config.status_command,
            ["pkexec", "cat", SWITCHEROO_PATH]
        );
        assert_eq!(config.lookup_command, ["lspci", "-mm", "-s"]);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"{ "poll_interval_ms": 250, "parse_policy": "lenient" }"#,
        );

        let config = ConfigManager::new(file.path()).load().unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.parse_policy, ParsePolicy::Lenient);
        assert_eq!(config.lookup_command, ["lspci", "-mm", "-s"]);
    }

    #[test]
    fn status_file_selects_file_reader() {
        let file = write_config(
            r#"{ "status_file": "/sys/kernel/debug/vgaswitcheroo/switch" }"#,
        );

        let config = ConfigManager::new(file.path()).load().unwrap();

        assert!(matches!(config.reader(), SwitcherooReader::File(_)));
        assert!(matches!(
            Config::default().reader(),
            SwitcherooReader::Command(_)
        ));
    }

    #[test]
    fn invalid_files_are_rejected() {
        let file = write_config("{ not json");
        let err = ConfigManager::new(file.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let file = write_config(r#"{ "parse_policy": "sloppy" }"#);
        let err = ConfigManager::new(file.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let file = write_config(r#"{ "poll_interval_ms": 0 }"#);
        let err = ConfigManager::new(file.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let file = write_config(r#"{ "lookup_command": [] }"#);
        let err = ConfigManager::new(file.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
