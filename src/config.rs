use std::fs;
use std::path::{Path, PathBuf};

use dirs::config_dir;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::SizeUnit;
use crate::view_cache::{SortDirection, SortKey};

const CONFIG_DIR_NAME: &str = "large-folder-finder";
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_THRESHOLD: f64 = 100.0;
pub const DEFAULT_TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_depth_for_count: usize,
    pub use_parallel_scan: bool,
    pub skip_folder_count: bool,
    pub use_physical_size: bool,
    pub scan_threads: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth_for_count: 3,
            use_parallel_scan: true,
            skip_folder_count: false,
            use_physical_size: true,
            scan_threads: None,
        }
    }
}

impl ScanConfig {
    pub fn default_path() -> PathBuf {
        let mut base = config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.push(CONFIG_DIR_NAME);
        base.push(CONFIG_FILE_NAME);
        base
    }

    pub fn load() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            let config = Self::default();
            if let Err(err) = config.save_to(&path) {
                debug!("lff could not write default config: {err}");
            }
            return config;
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!("lff config ignored: {err}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Separator {
    Tab,
    #[default]
    Space,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub threshold: f64,
    pub unit: SizeUnit,
    pub include_files: bool,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
    pub separator: Separator,
    pub tab_width: usize,
    pub filter: String,
    pub filter_is_regex: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            unit: SizeUnit::GB,
            include_files: false,
            sort_key: SortKey::Size,
            sort_direction: SortDirection::Descending,
            separator: Separator::Space,
            tab_width: DEFAULT_TAB_WIDTH,
            filter: String::new(),
            filter_is_regex: false,
        }
    }
}

impl ViewSettings {
    pub fn threshold_bytes(&self) -> u64 {
        self.unit.to_bytes(self.threshold)
    }

    pub fn tab_width(&self) -> usize {
        self.tab_width.max(1)
    }

    pub fn use_spaces(&self) -> bool {
        self.separator == Separator::Space
    }

    pub fn sort_by(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.sort_direction = self.sort_direction.reversed();
        } else {
            self.sort_key = key;
            self.sort_direction = match key {
                SortKey::Size | SortKey::Date => SortDirection::Descending,
                SortKey::Name | SortKey::Type => SortDirection::Ascending,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = ScanConfig {
            max_depth_for_count: 5,
            use_parallel_scan: false,
            skip_folder_count: true,
            use_physical_size: false,
            scan_threads: Some(3),
        };
        config.save_to(&path).expect("save");
        assert_eq!(ScanConfig::load_from(&path).expect("load"), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"use_parallel_scan": false}"#).expect("parse");
        assert!(!config.use_parallel_scan);
        assert_eq!(config.max_depth_for_count, 3);
        assert!(config.use_physical_size);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{not json").expect("write");
        assert!(matches!(
            ScanConfig::load_from(&path),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn view_settings_sort_toggle() {
        let mut settings = ViewSettings::default();
        assert_eq!(settings.threshold_bytes(), 100 * SizeUnit::GB.bytes_per_unit());
        settings.sort_by(SortKey::Size);
        assert_eq!(settings.sort_direction, SortDirection::Ascending);
        settings.sort_by(SortKey::Name);
        assert_eq!(settings.sort_key, SortKey::Name);
        assert_eq!(settings.sort_direction, SortDirection::Ascending);
        settings.tab_width = 0;
        assert_eq!(settings.tab_width(), 1);
    }
}
