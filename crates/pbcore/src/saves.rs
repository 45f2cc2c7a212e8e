//! Save file lookup.
//!
//! Saves are searched in the settings' write folder and read folders, each
//! resolved against the game's altroot and against the game install
//! directory. The newest [`MAX_CANDIDATES`] matches are returned, newest
//! first.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;

use crate::config::settings::SettingsRecord;
use crate::games::{GameConfig, LauncherConfig};

/// Extension of Beyond the Sword saves.
pub const SAVE_EXTENSION: &str = ".CivBeyondSwordSave";

/// Upper bound of returned candidates.
pub const MAX_CANDIDATES: usize = 20;

/// A save file matching the search pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveCandidate {
    /// Full path to the save file
    pub path: PathBuf,
    /// Creation time (modification time where the platform has none)
    pub created: SystemTime,
}

/// Append the save extension unless `pattern` already ends with it.
pub fn with_save_extension(pattern: &str) -> String {
    if pattern
        .to_lowercase()
        .ends_with(&SAVE_EXTENSION.to_lowercase())
    {
        pattern.to_string()
    } else {
        format!("{pattern}{SAVE_EXTENSION}")
    }
}

/// Directories to search for saves of `game`, in lookup order.
///
/// Write folder first, then the read folders; each one inside the altroot
/// and then inside the install directory.
pub fn search_roots(
    config: &LauncherConfig,
    game: &GameConfig,
    settings: &SettingsRecord,
) -> Vec<PathBuf> {
    settings
        .save_folders()
        .iter()
        .flat_map(|folder| [game.altroot.join(folder), config.civ4_path.join(folder)])
        .collect()
}

/// Find saves matching the glob `pattern` below `roots`.
///
/// `regex_filter`, if given, must match somewhere in the full path. An
/// invalid expression is matched literally instead. Files that vanish or
/// can't be inspected during the scan are skipped.
pub fn find_candidates(
    roots: &[PathBuf],
    pattern: &str,
    regex_filter: Option<&str>,
) -> Vec<SaveCandidate> {
    let pattern = with_save_extension(pattern);
    let filter = regex_filter.map(build_filter);

    let mut candidates = Vec::new();
    for root in roots {
        let full = format!("{}/{}", glob::Pattern::escape(&root.to_string_lossy()), pattern);
        let entries = match glob::glob(&full) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Invalid save pattern '{}': {}", pattern, e);
                return Vec::new();
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if let Some(filter) = &filter {
                if !filter.is_match(&path.to_string_lossy()) {
                    continue;
                }
            }

            match creation_time(&path) {
                Some(created) => candidates.push(SaveCandidate { path, created }),
                None => tracing::debug!("Skipping {}: no timestamp", path.display()),
            }
        }
    }

    rank_candidates(candidates)
}

/// Order candidates newest first and keep at most [`MAX_CANDIDATES`].
///
/// Candidates with equal timestamps keep their relative order.
pub fn rank_candidates(mut candidates: Vec<SaveCandidate>) -> Vec<SaveCandidate> {
    candidates.sort_by(|a, b| b.created.cmp(&a.created));
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// Path filter for the optional regular expression.
enum PathFilter {
    Regex(Regex),
    Literal(String),
}

impl PathFilter {
    fn is_match(&self, path: &str) -> bool {
        match self {
            PathFilter::Regex(re) => re.is_match(path),
            PathFilter::Literal(s) => path.contains(s.as_str()),
        }
    }
}

fn build_filter(expr: &str) -> PathFilter {
    match Regex::new(expr) {
        Ok(re) => PathFilter::Regex(re),
        Err(e) => {
            tracing::warn!(
                "'{}' is not a valid regular expression ({}), matching it literally",
                expr,
                e
            );
            PathFilter::Literal(expr.to_string())
        }
    }
}

fn creation_time(path: &Path) -> Option<SystemTime> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    metadata.created().or_else(|_| metadata.modified()).ok()
}
