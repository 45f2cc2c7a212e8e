//! Launcher configuration: where the game is installed and which Pitboss
//! games (altroots) this host runs.
//!
//! Loaded once at startup from `pbLauncher.json` and passed by reference
//! afterwards. Every value is optional in the file; missing values fall back
//! to the stock layout (two games `PB1`/`PB2` next to the launcher).
//!
//! ```json
//! {
//!  "civ4_path": "$HOME/Civ4/Beyond the Sword",
//!  "altroot_basedir": "$HOME/PBStats/PBs",
//!  "mod": "PB Mod_v7",
//!  "restart_timeout": 3,
//!  "games": {
//!   "1": {"name": "Pitboss 1", "altroot": "PB1"},
//!   "2": {"name": "Pitboss 2", "altroot": "PB2", "mod": "Other Mod"}
//!  }
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::paths::expand_vars;

pub const DEFAULT_CIV4_PATH: &str = "$HOME/Civ4/Beyond the Sword";
pub const DEFAULT_MOD: &str = "PB Mod_v7";
pub const DEFAULT_RESTART_TIMEOUT: u64 = 3;
pub const DEFAULT_CONFIG_FILE: &str = "pbLauncher.json";

/// One Pitboss game hosted by this launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub id: String,
    /// Display name for menus and logs
    pub name: String,
    /// Mod loaded when the save doesn't dictate one
    pub mod_name: String,
    /// Altroot directory holding this game's saves and settings
    pub altroot: PathBuf,
}

/// Virtual framebuffer options (Linux only).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct XvfbConfig {
    pub enabled: bool,
    /// Framebuffer directory, `{GAMEID}` is replaced with the game id
    pub dir: String,
    /// Xauth cookie file, `{GAMEID}` is replaced with the game id
    pub cookie: String,
}

impl Default for XvfbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "/run/shm/{GAMEID}".to_string(),
            cookie: "/tmp/{GAMEID}".to_string(),
        }
    }
}

impl XvfbConfig {
    pub fn dir_for(&self, game_id: &str) -> PathBuf {
        PathBuf::from(expand_vars(&self.dir.replace("{GAMEID}", game_id)))
    }

    pub fn cookie_for(&self, game_id: &str) -> PathBuf {
        PathBuf::from(expand_vars(&self.cookie.replace("{GAMEID}", game_id)))
    }
}

/// Resolved launcher configuration. Immutable after loading.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Game install directory (without executable name)
    pub civ4_path: PathBuf,
    /// Base directory for relative altroot paths
    pub altroot_basedir: PathBuf,
    pub default_mod: String,
    /// Seconds to wait before the server restarts
    pub restart_timeout: u64,
    /// Stop after this many restarts; `None` keeps the server up forever
    pub max_restarts: Option<u32>,
    /// Drop noisy Wine/engine lines from the server output
    pub filter_output: bool,
    pub xvfb: XvfbConfig,
    games: BTreeMap<String, GameConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LauncherFile {
    civ4_path: Option<String>,
    altroot_basedir: Option<String>,
    #[serde(rename = "mod")]
    default_mod: Option<String>,
    restart_timeout: Option<u64>,
    max_restarts: Option<u32>,
    filter_output: bool,
    xvfb: XvfbConfig,
    games: Option<BTreeMap<String, GameFile>>,
}

#[derive(Debug, Deserialize)]
struct GameFile {
    name: Option<String>,
    #[serde(rename = "mod")]
    mod_name: Option<String>,
    altroot: Option<String>,
}

#[derive(Debug, Error)]
pub enum LauncherConfigError {
    #[error("failed to parse launcher config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read launcher config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LauncherConfig {
    /// Minimal configuration without any games.
    pub fn new(civ4_path: impl Into<PathBuf>, altroot_basedir: impl Into<PathBuf>) -> Self {
        Self {
            civ4_path: civ4_path.into(),
            altroot_basedir: altroot_basedir.into(),
            default_mod: DEFAULT_MOD.to_string(),
            restart_timeout: DEFAULT_RESTART_TIMEOUT,
            max_restarts: None,
            filter_output: false,
            xvfb: XvfbConfig::default(),
            games: BTreeMap::new(),
        }
    }

    /// Add a game using the default mod. Relative altroots are resolved
    /// against the base directory.
    pub fn with_game(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        altroot: impl AsRef<Path>,
    ) -> Self {
        let id = id.into();
        let altroot = self.altroot_basedir.join(altroot);
        self.games.insert(
            id.clone(),
            GameConfig {
                id,
                name: name.into(),
                mod_name: self.default_mod.clone(),
                altroot,
            },
        );
        self
    }

    pub fn with_default_mod(mut self, mod_name: impl Into<String>) -> Self {
        self.default_mod = mod_name.into();
        self
    }

    /// Load the config file, or use the stock layout if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self, LauncherConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::info!("Load launcher config {}", path.display());
                Self::from_json(&content)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("{} not found, using built-in games", path.display());
                Self::from_json("{}")
            }
            Err(source) => Err(LauncherConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse and resolve a config document.
    pub fn from_json(content: &str) -> Result<Self, LauncherConfigError> {
        let file: LauncherFile = serde_json::from_str(content)?;
        Ok(Self::resolve(file))
    }

    fn resolve(file: LauncherFile) -> Self {
        let civ4_path = PathBuf::from(expand_vars(
            file.civ4_path.as_deref().unwrap_or(DEFAULT_CIV4_PATH),
        ));
        let altroot_basedir = match file.altroot_basedir.as_deref() {
            Some(dir) => PathBuf::from(expand_vars(dir)),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        let default_mod = expand_vars(file.default_mod.as_deref().unwrap_or(DEFAULT_MOD));

        let mut config = LauncherConfig {
            restart_timeout: file.restart_timeout.unwrap_or(DEFAULT_RESTART_TIMEOUT),
            max_restarts: file.max_restarts,
            filter_output: file.filter_output,
            xvfb: file.xvfb,
            ..LauncherConfig::new(civ4_path, altroot_basedir).with_default_mod(default_mod)
        };

        match file.games {
            Some(games) => {
                for (id, game) in games {
                    let altroot = expand_vars(game.altroot.as_deref().unwrap_or(&id));
                    let altroot = config.altroot_basedir.join(altroot);
                    let mod_name = game
                        .mod_name
                        .map(|m| expand_vars(&m))
                        .unwrap_or_else(|| config.default_mod.clone());
                    let name = game
                        .name
                        .map(|n| expand_vars(&n))
                        .unwrap_or_else(|| format!("Pitboss {id}"));
                    config.games.insert(
                        id.clone(),
                        GameConfig {
                            id,
                            name,
                            mod_name,
                            altroot,
                        },
                    );
                }
            }
            None => {
                config = config
                    .with_game("1", "Pitboss 1", "PB1")
                    .with_game("2", "Pitboss 2", "PB2");
            }
        }

        config
    }

    pub fn game(&self, id: &str) -> Option<&GameConfig> {
        self.games.get(id)
    }

    /// Games ordered by id.
    pub fn games(&self) -> impl Iterator<Item = &GameConfig> {
        self.games.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_games() {
        let config = LauncherConfig::from_json(r#"{"altroot_basedir": "/srv/PBs"}"#).unwrap();
        let ids: Vec<&str> = config.games().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let game = config.game("2").unwrap();
        assert_eq!(game.name, "Pitboss 2");
        assert_eq!(game.mod_name, DEFAULT_MOD);
        assert_eq!(game.altroot, PathBuf::from("/srv/PBs/PB2"));
        assert_eq!(config.restart_timeout, 3);
        assert!(config.max_restarts.is_none());
        assert!(!config.xvfb.enabled);
    }

    #[test]
    fn test_custom_games() {
        let config = LauncherConfig::from_json(
            r#"{
 "civ4_path": "/opt/civ4/Beyond the Sword",
 "altroot_basedir": "/srv/PBs",
 "mod": " PB Mod_v8 ",
 "restart_timeout": 10,
 "max_restarts": 2,
 "games": {
  "pb7": {"name": "Pitboss 7", "altroot": "/mnt/PB7"},
  "test": {"mod": "Test Mod"}
 }
}"#,
        )
        .unwrap();

        assert_eq!(config.civ4_path, PathBuf::from("/opt/civ4/Beyond the Sword"));
        assert_eq!(config.default_mod, "PB Mod_v8");
        assert_eq!(config.restart_timeout, 10);
        assert_eq!(config.max_restarts, Some(2));

        let pb7 = config.game("pb7").unwrap();
        assert_eq!(pb7.altroot, PathBuf::from("/mnt/PB7"));
        assert_eq!(pb7.mod_name, "PB Mod_v8");

        let test = config.game("test").unwrap();
        assert_eq!(test.name, "Pitboss test");
        assert_eq!(test.mod_name, "Test Mod");
        assert_eq!(test.altroot, PathBuf::from("/srv/PBs/test"));

        assert!(config.game("1").is_none());
    }

    #[test]
    fn test_xvfb_templates() {
        let xvfb = XvfbConfig::default();
        assert_eq!(xvfb.dir_for("3"), PathBuf::from("/run/shm/3"));
        assert_eq!(xvfb.cookie_for("3"), PathBuf::from("/tmp/3"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LauncherConfig::load(&tmp.path().join("pbLauncher.json")).unwrap();
        assert!(config.game("1").is_some());
    }

    #[test]
    fn test_load_bad_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pbLauncher.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            LauncherConfig::load(&path),
            Err(LauncherConfigError::Parse(_))
        ));
    }
}
