use crate::path_codec::DEFAULT_VIRTUAL_COMPONENT;
use crate::placeholder::PlaceholderSizing;
use crate::visibility::LazyLoadConfig;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timings: bool,
    pub log_level: String,
    pub filter: FilterConfig,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timings: false,
            log_level: "info".into(),
            filter: FilterConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub maxwidth: Option<u32>,
    pub loadonvisible: bool,
    pub eager_load_count: usize,
    pub virtual_component: String,
    pub placeholder_sizing: PlaceholderSizing,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            maxwidth: None,
            loadonvisible: false,
            eager_load_count: 0,
            virtual_component: DEFAULT_VIRTUAL_COMPONENT.into(),
            placeholder_sizing: PlaceholderSizing::Natural,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: "files".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display(path),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: display(path),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(contents)?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        if self.log_level.trim().is_empty() {
            self.log_level = "info".into();
        }
        if self.store.root.trim().is_empty() {
            self.store.root = "files".into();
        }
        self.filter.normalize();
    }
}

impl FilterConfig {
    fn normalize(&mut self) {
        if self.maxwidth == Some(0) {
            self.maxwidth = None;
        }
        let trimmed = self.virtual_component.trim();
        if trimmed.is_empty() {
            self.virtual_component = DEFAULT_VIRTUAL_COMPONENT.into();
        } else if trimmed.len() != self.virtual_component.len() {
            self.virtual_component = trimmed.to_string();
        }
    }

    pub fn redirect_enabled(&self) -> bool {
        self.maxwidth.is_some()
    }

    pub fn lazy_load(&self) -> LazyLoadConfig {
        LazyLoadConfig {
            enabled: self.loadonvisible,
            eager_load_count: self.eager_load_count,
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn default_config_path(input_path: &Path) -> PathBuf {
    let dir = input_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join("imageopt.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").expect("parse");
        assert!(!config.filter.redirect_enabled());
        assert!(!config.filter.loadonvisible);
        assert_eq!(config.filter.virtual_component, "filter_imageopt");
        assert_eq!(config.filter.placeholder_sizing, PlaceholderSizing::Natural);
        assert_eq!(config.store.root, "files");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn parses_filter_section() {
        let config = Config::parse(
            r#"
timings = true

[filter]
maxwidth = 480
loadonvisible = true
eager_load_count = 3
placeholder_sizing = "max_width"

[store]
root = "/srv/files"
"#,
        )
        .expect("parse");
        assert!(config.timings);
        assert_eq!(config.filter.maxwidth, Some(480));
        assert_eq!(
            config.filter.lazy_load(),
            LazyLoadConfig {
                enabled: true,
                eager_load_count: 3
            }
        );
        assert_eq!(config.filter.placeholder_sizing, PlaceholderSizing::MaxWidth);
        assert_eq!(config.store.root, "/srv/files");
    }

    #[test]
    fn zero_maxwidth_disables_redirection() {
        let config = Config::parse("[filter]\nmaxwidth = 0\nvirtual_component = \"  \"\n").expect("parse");
        assert_eq!(config.filter.maxwidth, None);
        assert_eq!(config.filter.virtual_component, "filter_imageopt");
    }

    #[test]
    fn load_reports_path_on_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("imageopt.toml");

        let err = Config::load(&path).expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));

        fs::write(&path, "[filter]\nmaxwidth = \"wide\"\n").expect("write");
        let err = Config::load(&path).expect_err("bad value");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("imageopt.toml"));

        fs::write(&path, "[filter]\nmaxwidth = 640\n").expect("write");
        assert_eq!(Config::load(&path).expect("load").filter.maxwidth, Some(640));
    }

    #[test]
    fn default_path_sits_next_to_input() {
        assert_eq!(
            default_config_path(Path::new("pages/index.html")),
            PathBuf::from("pages/imageopt.toml")
        );
    }
}
