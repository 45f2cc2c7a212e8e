//! Decide which save a server starts with.
//!
//! Combines the stored settings, the saves on disk and the optional save
//! pattern / password given on the command line into one
//! [`SelectionResult`]. A pattern override that finds a save also makes
//! that save the stored default for later runs.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::autostart::{autostart_filename, should_autostart};
use crate::config::settings::{SettingsError, SettingsRecord, SettingsSource, SettingsStore};
use crate::games::LauncherConfig;
use crate::savemeta::ModNameSource;
use crate::saves::{find_candidates, search_roots, SaveCandidate};

/// Why a launch must not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("unknown game `{0}`")]
    UnknownGame(String),
    #[error("no configuration: {0}")]
    NoConfiguration(String),
    #[error("no save found for pattern '{0}'")]
    NoSaveFound(String),
    #[error("cannot read mod name of {path:?}: {message}")]
    Metadata { path: PathBuf, message: String },
}

/// Outcome of writing the chosen save back to the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistStatus {
    /// No override, nothing to store
    NotRequested,
    Written,
    /// The run continues with the old settings document on disk
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Save the server should load; `None` starts without a save
    pub save: Option<PathBuf>,
    /// Mod to start the server with
    pub mod_name: String,
    pub autostart: bool,
    pub abort: Option<AbortReason>,
    pub persist: PersistStatus,
}

impl SelectionResult {
    fn aborted(mod_name: &str, autostart: bool, reason: AbortReason) -> Self {
        tracing::error!("{}", reason);
        Self {
            save: None,
            mod_name: mod_name.to_string(),
            autostart,
            abort: Some(reason),
            persist: PersistStatus::NotRequested,
        }
    }

    pub fn is_abort(&self) -> bool {
        self.abort.is_some()
    }
}

/// Select the save for `game_id`.
///
/// `save_pattern` is a regular expression matched against the full paths of
/// the saves; the newest match is used and stored as the game's default,
/// together with `password` if given. Without a pattern the stored save
/// name is used the same way, but nothing is written. A stored name that is
/// the path of an existing file only selects that file.
pub fn select(
    config: &LauncherConfig,
    game_id: &str,
    save_pattern: Option<&str>,
    password: Option<&str>,
    meta: &impl ModNameSource,
) -> SelectionResult {
    select_with(
        config,
        &SettingsStore::new(config),
        game_id,
        save_pattern,
        password,
        meta,
    )
}

/// [`select`] with the settings read from and written to `store`.
pub fn select_with(
    config: &LauncherConfig,
    store: &impl SettingsSource,
    game_id: &str,
    save_pattern: Option<&str>,
    password: Option<&str>,
    meta: &impl ModNameSource,
) -> SelectionResult {
    let Some(game) = config.game(game_id) else {
        return SelectionResult::aborted(
            &config.default_mod,
            false,
            AbortReason::UnknownGame(game_id.to_string()),
        );
    };

    let mut settings = match store.load_settings(game_id) {
        Ok(s) => s,
        Err(e) => {
            return SelectionResult::aborted(
                &game.mod_name,
                false,
                AbortReason::NoConfiguration(e.to_string()),
            );
        }
    };

    let save_pattern = save_pattern.filter(|p| !p.is_empty());
    let pattern = save_pattern
        .or_else(|| autostart_filename(&settings))
        .unwrap_or("")
        .to_string();

    let roots = search_roots(config, game, &settings);
    let filter = stored_filter(&pattern, save_pattern.is_none());
    let candidates = find_candidates(&roots, "*", filter.as_deref());
    let newest = candidates.first().map(|c| c.path.clone());

    let mut persist = PersistStatus::NotRequested;
    if let (Some(_), Some(path)) = (save_pattern, &newest) {
        settings.replace_save(&path.to_string_lossy(), password);
        persist = match store.store_settings(game_id, &settings) {
            Ok(()) => {
                tracing::info!("Stored {} as save to load", path.display());
                PersistStatus::Written
            }
            Err(e) => {
                tracing::error!("Write of settings failed, continuing without storing: {}", e);
                PersistStatus::Failed(e.to_string())
            }
        };
    }

    let autostart = should_autostart(&settings);
    if autostart {
        tracing::info!("Autostart {}", settings.save_filename().unwrap_or("?"));
    }

    let mod_name = match (&newest, autostart) {
        (None, true) => {
            let mut result = SelectionResult::aborted(
                &game.mod_name,
                autostart,
                AbortReason::NoSaveFound(pattern),
            );
            result.persist = persist;
            return result;
        }
        (Some(path), true) => match meta.mod_name(path) {
            Ok(name) => name,
            Err(e) => {
                let mut result = SelectionResult::aborted(
                    &game.mod_name,
                    autostart,
                    AbortReason::Metadata {
                        path: path.clone(),
                        message: e.to_string(),
                    },
                );
                result.persist = persist;
                return result;
            }
        },
        (_, false) => game.mod_name.clone(),
    };
    tracing::info!("Mod name: {}", mod_name);

    SelectionResult {
        save: newest,
        mod_name,
        autostart,
        abort: None,
        persist,
    }
}

/// Path filter for the effective pattern. A stored pattern naming an
/// existing file is matched exactly, since saved paths often contain regex
/// metacharacters (`[Clan]`, `(2)`, `+`).
fn stored_filter(pattern: &str, from_settings: bool) -> Option<String> {
    if pattern.is_empty() {
        None
    } else if from_settings && Path::new(pattern).is_file() {
        Some(format!("^{}$", regex::escape(pattern)))
    } else {
        Some(pattern.to_string())
    }
}

/// The newest saves of `game_id`, optionally narrowed by a regular
/// expression on the full path.
///
/// A game without settings is searched in the default save folder.
pub fn list_saves(
    config: &LauncherConfig,
    game_id: &str,
    pattern: Option<&str>,
) -> Result<Vec<SaveCandidate>, SettingsError> {
    let game = config
        .game(game_id)
        .ok_or_else(|| SettingsError::UnknownGame(game_id.to_string()))?;
    let settings = match SettingsStore::new(config).load(game_id) {
        Ok(s) => s,
        Err(e) if e.is_not_found() => {
            tracing::warn!("{}, searching default folders", e);
            SettingsRecord::default()
        }
        Err(e) => return Err(e),
    };

    let roots = search_roots(config, game, &settings);
    Ok(find_candidates(&roots, "*", pattern.filter(|p| !p.is_empty())))
}
