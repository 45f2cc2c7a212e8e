//! Keeps `PitbossSMTPLogin` in the altroot's `CivilizationIV.ini` pointing
//! at the altroot itself.
//!
//! The Pitboss executable reads that option to locate its altroot-specific
//! data. A copied seed folder still carries the path of the folder it was
//! copied from, so the value is checked and rewritten before each start.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::ini::IniFile;
use crate::paths::{altroot_for_game, wine_to_linux};

pub const INI_FILE: &str = "CivilizationIV.ini";
pub const SMTP_LOGIN_KEY: &str = "PitbossSMTPLogin";
const CONFIG_SECTION: &str = "CONFIG";

#[derive(Debug, Error)]
pub enum IniFixError {
    #[error("{0:?} not found")]
    Missing(PathBuf),
    #[error("failed to update {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// State of the altroot option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IniCheck {
    Matches,
    /// Option is unset or points somewhere else
    Differs { current: Option<String> },
    /// No `CivilizationIV.ini` in the altroot
    Missing,
}

fn ini_path(altroot: &Path) -> PathBuf {
    altroot.join(INI_FILE)
}

/// Whether `value` names the same altroot as `expected`.
///
/// Older launchers wrote the Wine path with doubled backslashes
/// (`Z:\\home\\pb`), which counts as the same directory.
fn same_altroot(value: &str, expected: &str) -> bool {
    let value = value.replace("\\\\", "\\");
    value == expected || wine_to_linux(&value) == wine_to_linux(expected)
}

/// Check the altroot option of the ini inside `altroot`.
pub fn check_altroot_login(altroot: &Path) -> Result<IniCheck, IniFixError> {
    let path = ini_path(altroot);
    if !path.is_file() {
        return Ok(IniCheck::Missing);
    }
    let ini = IniFile::read(&path).map_err(|source| IniFixError::Io {
        path: path.clone(),
        source,
    })?;

    let expected = altroot_for_game(altroot);
    Ok(match ini.find(SMTP_LOGIN_KEY) {
        Some(current) if same_altroot(current, &expected) => IniCheck::Matches,
        current => IniCheck::Differs {
            current: current.map(ToString::to_string),
        },
    })
}

/// Make the altroot option point at `altroot`, rewriting the ini if needed.
///
/// Only the option's value changes; every other line is written back as read.
pub fn fix_altroot_login(altroot: &Path) -> Result<(), IniFixError> {
    let path = ini_path(altroot);
    match check_altroot_login(altroot)? {
        IniCheck::Matches => return Ok(()),
        IniCheck::Missing => return Err(IniFixError::Missing(path)),
        IniCheck::Differs { current } => {
            tracing::info!(
                "{} in {} is {:?}, updating",
                SMTP_LOGIN_KEY,
                path.display(),
                current.unwrap_or_default()
            );
        }
    }

    let mut ini = IniFile::read(&path).map_err(|source| IniFixError::Io {
        path: path.clone(),
        source,
    })?;
    let expected = altroot_for_game(altroot);
    if ini.replace_all(SMTP_LOGIN_KEY, &expected) == 0 {
        ini.set(CONFIG_SECTION, SMTP_LOGIN_KEY, &expected);
    }
    ini.write(&path)
        .map_err(|source| IniFixError::Io { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED_INI: &str = "\r\n[CONFIG]\r\n\r\n; Login for pitboss SMTP\r\nPitbossSMTPLogin=Z:\\home\\pb\\seed\r\n\r\n; Screen width\r\nScreenWidth=640\r\n";

    #[test]
    fn test_missing_ini() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(check_altroot_login(tmp.path()).unwrap(), IniCheck::Missing);
        assert!(matches!(
            fix_altroot_login(tmp.path()),
            Err(IniFixError::Missing(_))
        ));
    }

    #[test]
    fn test_fix_rewrites_only_option() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(INI_FILE);
        std::fs::write(&path, SEED_INI).unwrap();

        assert!(matches!(
            check_altroot_login(tmp.path()).unwrap(),
            IniCheck::Differs { current: Some(_) }
        ));
        fix_altroot_login(tmp.path()).unwrap();
        assert_eq!(check_altroot_login(tmp.path()).unwrap(), IniCheck::Matches);

        let expected = altroot_for_game(tmp.path());
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            SEED_INI.replace("Z:\\home\\pb\\seed", &expected)
        );
    }

    #[test]
    fn test_fix_is_noop_when_matching() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(INI_FILE);
        let content = format!(
            "[CONFIG]\n{}={}\n",
            SMTP_LOGIN_KEY,
            altroot_for_game(tmp.path())
        );
        std::fs::write(&path, &content).unwrap();

        fix_altroot_login(tmp.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_doubled_backslashes_match() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(INI_FILE);
        let doubled = altroot_for_game(tmp.path()).replace('\\', "\\\\");
        let content = format!("[CONFIG]\r\n{SMTP_LOGIN_KEY}={doubled}\r\n");
        std::fs::write(&path, &content).unwrap();

        assert_eq!(check_altroot_login(tmp.path()).unwrap(), IniCheck::Matches);
        fix_altroot_login(tmp.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_fix_adds_missing_option() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(INI_FILE), "[CONFIG]\nScreenWidth=640\n").unwrap();

        fix_altroot_login(tmp.path()).unwrap();
        assert_eq!(check_altroot_login(tmp.path()).unwrap(), IniCheck::Matches);
    }
}
