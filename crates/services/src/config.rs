//! Application configuration loaded from TOML.
//!
//! Lookup order: an explicit path, then `mentor.toml` in the working
//! directory, then built-in defaults. `MENTOR_DB_URL` overrides `db_url`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use mentor_core::policy::Policies;
use mentor_core::quiz::QuestionBankSet;

use crate::error::ConfigError;

pub const DB_URL_ENV: &str = "MENTOR_DB_URL";
pub const DEFAULT_CONFIG_FILE: &str = "mentor.toml";
pub const DEFAULT_DB_URL: &str = "sqlite:mentor.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_url: String,
    /// Replaces the bundled question banks when set.
    pub question_bank: Option<PathBuf>,
    pub policy: Policies,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.to_owned(),
            question_bank: None,
            policy: Policies::default(),
        }
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or unknown policy names.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load the config file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an explicit path cannot be read or any file
    /// found fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            }
        };

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.override_db_url(std::env::var(DB_URL_ENV).ok());
        Ok(config)
    }

    /// Replace `db_url` with a non-blank override.
    pub fn override_db_url(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) {
            self.db_url = url;
        }
    }

    /// The configured question banks, or the bundled ones.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the bank file cannot be read or fails
    /// validation.
    pub fn question_banks(&self) -> Result<QuestionBankSet, ConfigError> {
        match &self.question_bank {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                QuestionBankSet::from_toml(&raw).map_err(|source| ConfigError::QuestionBank {
                    path: path.clone(),
                    source,
                })
            }
            None => Ok(QuestionBankSet::builtin()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::policy::{CompletionStampPolicy, MeetingTimePolicy, UnassignPolicy};
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.policy.unassign, UnassignPolicy::SilentNoop);
    }

    #[test]
    fn policies_parse_from_snake_case() {
        let config = AppConfig::from_toml_str(
            r#"
db_url = "sqlite::memory:"

[policy]
completion_stamp = "restamp"
unassign = "reject"
meeting_time = "reject"
"#,
        )
        .unwrap();
        assert_eq!(config.db_url, "sqlite::memory:");
        assert_eq!(config.policy.completion_stamp, CompletionStampPolicy::Restamp);
        assert_eq!(config.policy.unassign, UnassignPolicy::Reject);
        assert_eq!(config.policy.meeting_time, MeetingTimePolicy::Reject);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = AppConfig::from_toml_str("[policy]\nunassign = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn blank_override_keeps_configured_url() {
        let mut config = AppConfig::default();
        config.override_db_url(Some("   ".into()));
        assert_eq!(config.db_url, DEFAULT_DB_URL);
        config.override_db_url(Some("sqlite:other.db".into()));
        assert_eq!(config.db_url, "sqlite:other.db");
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_url = \"sqlite:from-file.db\"").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        // MENTOR_DB_URL may be set in the environment running the tests.
        if std::env::var(DB_URL_ENV).is_err() {
            assert_eq!(config.db_url, "sqlite:from-file.db");
        }
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn question_bank_file_overrides_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
version = "test"

[banks.intro]
questions = [{{ text = "2 + 2?", options = ["3", "4"], correct_answer = "1" }}]

[banks.exit]
questions = [{{ text = "Capital of France?", options = ["Paris", "Rome"], correct_answer = "0" }}]
"#
        )
        .unwrap();
        let config = AppConfig {
            question_bank: Some(file.path().to_path_buf()),
            ..AppConfig::default()
        };
        let banks = config.question_banks().unwrap();
        assert_eq!(banks.version, "test");

        let builtin = AppConfig::default().question_banks().unwrap();
        assert_ne!(builtin.version, "test");
    }

    #[test]
    fn malformed_question_bank_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "version = \"x\"\n[banks.intro]\nquestions = []\n").unwrap();
        let config = AppConfig {
            question_bank: Some(file.path().to_path_buf()),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.question_banks(),
            Err(ConfigError::QuestionBank { .. })
        ));
    }
}
