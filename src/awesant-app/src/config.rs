// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Trait for loading TOML configuration files with default search paths.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Config filename (e.g., "awesant.toml").
    fn config_filename() -> &'static str;

    /// Load config from a specific file path.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Search default paths and load the first config found.
    ///
    /// Returns `(config, path_where_found)` or `(Default::default(), None)`.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in Self::default_search_paths() {
            if path.exists() {
                let cfg = Self::load_from_file(&path)?;
                return Ok((cfg, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Default search paths (current dir → XDG → /etc).
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(Self::config_filename())];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("awesant").join(Self::config_filename()));
        }

        paths.push(PathBuf::from("/etc/awesant").join(Self::config_filename()));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize)]
    struct DemoConfig {
        #[serde(default)]
        name: String,
        #[serde(default)]
        poll: u64,
    }

    impl ConfigFile for DemoConfig {
        fn config_filename() -> &'static str {
            "demo.toml"
        }
    }

    #[test]
    fn loads_from_explicit_path() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name = \"x\"\npoll = 250").unwrap();
        let cfg = DemoConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg.name, "x");
        assert_eq!(cfg.poll, 250);
    }

    #[test]
    fn parse_error_names_the_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name = [broken").unwrap();
        let err = DemoConfig::load_from_file(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn search_paths_end_in_etc() {
        let paths = DemoConfig::default_search_paths();
        assert_eq!(paths.first().unwrap(), &PathBuf::from("demo.toml"));
        assert_eq!(
            paths.last().unwrap(),
            &PathBuf::from("/etc/awesant/demo.toml")
        );
    }
}
