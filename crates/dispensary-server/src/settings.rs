//! Runtime server configuration.

use std::path::{Path, PathBuf};

use dispensary_core::alerts::DEFAULT_LOOKAHEAD_DAYS;
use serde::Deserialize;

/// Deserialised from `config.toml` layered under `DISPENSARY_*` environment
/// variables. Every field has a default, so an empty source is valid.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  pub alert_lookahead_days: i64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_string(),
      port:                 8088,
      store_path:           PathBuf::from("dispensary.db"),
      alert_lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
    }
  }
}

impl ServerConfig {
  /// Layer the optional file at `path` under the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DISPENSARY"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_source_yields_defaults() {
    let cfg: ServerConfig = config::Config::builder()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:8088");
    assert_eq!(cfg.store_path, PathBuf::from("dispensary.db"));
    assert_eq!(cfg.alert_lookahead_days, DEFAULT_LOOKAHEAD_DAYS);
  }

  #[test]
  fn overrides_replace_single_fields() {
    let cfg: ServerConfig = config::Config::builder()
      .set_override("port", 9000)
      .unwrap()
      .set_override("alert_lookahead_days", 60)
      .unwrap()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.alert_lookahead_days, 60);
    assert_eq!(cfg.host, "127.0.0.1");
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let cfg = ServerConfig::load(Path::new("/nonexistent/dispensary.toml")).unwrap();
    assert_eq!(cfg.port, ServerConfig::default().port);
  }

  #[test]
  fn relative_paths_are_left_alone() {
    assert_eq!(expand_tilde(Path::new("data/db.sqlite")), PathBuf::from("data/db.sqlite"));
  }
}
