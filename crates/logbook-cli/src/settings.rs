//! Runtime settings, read from `logbook.toml` and `LOGBOOK_*` variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf { PathBuf::from("logbook.db") }

impl Default for Settings {
  fn default() -> Self { Self { store_path: default_store_path() } }
}

impl Settings {
  /// Layer the optional config file under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("LOGBOOK"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise Settings")
  }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
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
  fn missing_file_falls_back_to_defaults() {
    let settings = Settings::load(Path::new("/nonexistent/logbook.toml")).unwrap();
    assert_eq!(settings, Settings::default());
  }

  #[test]
  fn relative_paths_are_left_alone() {
    let settings = Settings { store_path: PathBuf::from("data/logbook.db") };
    assert_eq!(settings.store_path(), PathBuf::from("data/logbook.db"));
  }
}
