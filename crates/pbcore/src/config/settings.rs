//! Parser/writer for the per-game `pbSettings.json`.
//!
//! Located at `<altroot>/pbSettings.json`. The document is shared with the
//! Pitboss mod running inside the server and is edited by hand between runs,
//! so everything we don't know about is carried through untouched.
//!
//! Recognized keys:
//! - `autostart` (bool) - load a save and start without confirmation
//! - `noGui` (bool) - headless server
//! - `shell.enable` (bool) - remote shell control
//! - `save.filename` (string) - pattern/name of the save to load
//! - `save.adminpw` (string) - admin password of that save
//! - `writefolder` (string) - save folder relative to the altroot
//! - `readfolders` (list of strings) - extra folders to search for saves

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::write_atomic;
use crate::games::LauncherConfig;

/// File name of the settings document inside an altroot.
pub const SETTINGS_FILE: &str = "pbSettings.json";

/// Default save folder, relative to the altroot.
pub const DEFAULT_WRITE_FOLDER: &str = "Saves/multi";

/// Typed view of `pbSettings.json`.
///
/// Unset recognized keys stay unset on write; unknown keys land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(
        default,
        deserialize_with = "loose_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub autostart: Option<bool>,
    #[serde(
        rename = "noGui",
        default,
        deserialize_with = "loose_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub no_gui: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<ShellSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save: Option<SaveSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writefolder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readfolders: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShellSettings {
    #[serde(
        default,
        deserialize_with = "loose_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub enable: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adminpw: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SettingsRecord {
    /// Parse from JSON text, coercing loosely typed flags.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize with one-space indentation and a trailing newline.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        // serde_json only emits valid UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn autostart(&self) -> bool {
        self.autostart.unwrap_or(false)
    }

    pub fn no_gui(&self) -> bool {
        self.no_gui.unwrap_or(false)
    }

    pub fn shell_enabled(&self) -> bool {
        self.shell
            .as_ref()
            .and_then(|s| s.enable)
            .unwrap_or(false)
    }

    /// Stored save name/pattern, if any.
    pub fn save_filename(&self) -> Option<&str> {
        self.save.as_ref().and_then(|s| s.filename.as_deref())
    }

    pub fn admin_password(&self) -> Option<&str> {
        self.save.as_ref().and_then(|s| s.adminpw.as_deref())
    }

    /// Save folders to search, write folder first.
    pub fn save_folders(&self) -> Vec<PathBuf> {
        let write = self
            .writefolder
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new("Saves").join("multi"));
        let mut folders = vec![write];
        folders.extend(
            self.readfolders
                .iter()
                .flatten()
                .map(PathBuf::from),
        );
        folders
    }

    /// Point the stored save at `filename`, and replace the admin password
    /// when one is given.
    pub fn replace_save(&mut self, filename: &str, adminpw: Option<&str>) {
        let save = self.save.get_or_insert_with(SaveSettings::default);
        save.filename = Some(filename.to_string());
        if let Some(pw) = adminpw.filter(|pw| !pw.is_empty()) {
            save.adminpw = Some(pw.to_string());
        }
    }
}

/// Accepts `true`/`false`, numbers (non-zero is true) and the strings
/// `"true"`, `"false"`, `"1"`, `"0"`, `"yes"`, `"no"` and `""`.
fn loose_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => Ok(Some(n.as_f64().is_some_and(|f| f != 0.0))),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" | "" => Ok(Some(false)),
            other => Err(D::Error::custom(format!(
                "expected a boolean, found string \"{other}\""
            ))),
        },
        Some(other) => Err(D::Error::custom(format!(
            "expected a boolean, found {other}"
        ))),
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown game `{0}`")]
    UnknownGame(String),
    #[error("settings file not found: {path:?}")]
    NotFound { path: PathBuf },
    #[error("failed to read settings from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed settings in {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SettingsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SettingsError::NotFound { .. })
    }
}

/// Where the settings documents of a launcher's games live.
pub trait SettingsSource {
    fn load_settings(&self, game_id: &str) -> Result<SettingsRecord, SettingsError>;
    fn store_settings(&self, game_id: &str, record: &SettingsRecord) -> Result<(), SettingsError>;
}

/// Loads and stores `pbSettings.json` for the games of a launcher config.
#[derive(Debug, Clone, Copy)]
pub struct SettingsStore<'a> {
    config: &'a LauncherConfig,
}

impl<'a> SettingsStore<'a> {
    pub fn new(config: &'a LauncherConfig) -> Self {
        Self { config }
    }

    /// Path of the settings document of `game_id`.
    pub fn path(&self, game_id: &str) -> Result<PathBuf, SettingsError> {
        self.config
            .game(game_id)
            .map(|g| g.altroot.join(SETTINGS_FILE))
            .ok_or_else(|| SettingsError::UnknownGame(game_id.to_string()))
    }

    /// Load the settings of `game_id`.
    ///
    /// A missing document is reported as [`SettingsError::NotFound`]; that
    /// is the normal state of a freshly created game.
    pub fn load(&self, game_id: &str) -> Result<SettingsRecord, SettingsError> {
        let path = self.path(game_id)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SettingsError::NotFound { path });
            }
            Err(source) => return Err(SettingsError::Read { path, source }),
        };
        SettingsRecord::parse(&content).map_err(|source| SettingsError::Malformed { path, source })
    }

    /// Write the settings of `game_id`. The old document stays in place if
    /// anything fails.
    pub fn save(&self, game_id: &str, record: &SettingsRecord) -> Result<(), SettingsError> {
        let path = self.path(game_id)?;
        let content = record.to_pretty_json().map_err(|e| SettingsError::Write {
            path: path.clone(),
            source: io::Error::other(e),
        })?;
        write_atomic(&path, content.as_bytes()).map_err(|source| SettingsError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }
}

impl SettingsSource for SettingsStore<'_> {
    fn load_settings(&self, game_id: &str) -> Result<SettingsRecord, SettingsError> {
        self.load(game_id)
    }

    fn store_settings(&self, game_id: &str, record: &SettingsRecord) -> Result<(), SettingsError> {
        self.save(game_id, record)
    }
}
