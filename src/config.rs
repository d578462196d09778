//! Process-wide scheduler settings, resolved through platform config
//! directories the same way the rest of this codebase family resolves its
//! on-disk configuration, plus the in-memory per-group config cache.

use crate::model::{GroupConfig, GroupId};
use crate::{Error, LibraryError};
use etcetera::{AppStrategy, AppStrategyArgs, choose_app_strategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, read_to_string, write};
use std::path::PathBuf;
use toml_edit::DocumentMut;

#[allow(clippy::missing_panics_doc)]
pub fn get_config_dir() -> PathBuf {
    let crate_name = env!("CARGO_PKG_NAME");
    if cfg!(feature = "testing") {
        let mut tmp_dir = PathBuf::from("/tmp");
        tmp_dir.push(crate_name);
        tmp_dir.push("config");
        create_dir_all(&tmp_dir).unwrap();
        return tmp_dir;
    }
    let strategy: etcetera::app_strategy::Xdg = choose_app_strategy(AppStrategyArgs {
        top_level_domain: "org".to_string(),
        author: crate_name.to_string(),
        app_name: crate_name.to_string(),
    })
    .unwrap();
    strategy.config_dir().push(crate_name);
    create_dir_all(strategy.config_dir()).unwrap();
    strategy.config_dir()
}

/// Process-wide knobs. Per-group, per-deck scheduling parameters live in the
/// `group_config`/`deck_meta` tables instead, since they are scoped to a
/// collection rather than to the machine running the process.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub queue_limit: usize,
    pub report_limit: usize,
    pub log_retry_delay_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            queue_limit: 200,
            report_limit: 1000,
            log_retry_delay_ms: 10,
        }
    }
}

fn get_settings_file() -> PathBuf {
    let mut path = get_config_dir();
    path.push("scheduler.toml");
    path
}

// `toml_edit` is used instead of a plain `serde` + `toml` round trip so that
// a config file written by an older version of this crate still deserializes
// after new keys are added; see the external-config comment in the codebase
// this pattern is drawn from.
pub fn read_settings() -> Result<SchedulerSettings, Error> {
    let path = get_settings_file();
    if !path.exists() {
        let settings = SchedulerSettings::default();
        write_settings(&settings)?;
        return Ok(settings);
    }
    let file_contents = read_to_string(&path).map_err(|e| Error::Io {
        description: format!("Failed to read {}.", path.display()),
        source: e,
    })?;
    let doc = file_contents
        .parse::<DocumentMut>()
        .map_err(|e| Error::Library(LibraryError::InvalidConfig(e.to_string())))?;
    let settings: SchedulerSettings = toml_edit::de::from_document(doc)
        .map_err(|e| Error::Library(LibraryError::InvalidConfig(e.to_string())))?;
    Ok(settings)
}

pub fn write_settings(settings: &SchedulerSettings) -> Result<(), Error> {
    let path = get_settings_file();
    let settings_string = toml_edit::ser::to_string_pretty(settings).map_err(|e| {
        Error::Library(LibraryError::InvalidConfig(format!(
            "Failed to serialize scheduler settings: {e}"
        )))
    })?;
    write(&path, settings_string).map_err(|e| Error::Io {
        description: "Failed to write scheduler settings".to_string(),
        source: e,
    })?;
    Ok(())
}

/// Caches [`GroupConfig`] rows for the lifetime of a session. Invalidated by
/// [`Self::reset`] on day rollover so stale per-group settings never survive
/// a reload.
#[derive(Debug, Default)]
pub struct ConfigCache {
    by_group: HashMap<GroupId, GroupConfig>,
}

impl ConfigCache {
    pub fn get(&self, gid: GroupId) -> Option<&GroupConfig> {
        self.by_group.get(&gid)
    }

    pub fn insert(&mut self, config: GroupConfig) {
        self.by_group.insert(config.gid, config);
    }

    pub fn reset(&mut self) {
        self.by_group.clear();
    }
}
