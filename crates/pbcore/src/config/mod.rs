//! Per-game configuration documents kept inside each altroot.
//!
//! - `pbSettings.json`: server settings read by the Pitboss mod and by us
//! - `CivilizationIV.ini`: the game's own ini, which must point at the altroot

pub mod civ4_ini;
pub mod ini;
pub mod settings;

use std::io::Write;
use std::path::Path;

/// Replace `path` with `contents` in one step.
///
/// Writes to a temp file next to the target and renames it over the
/// target, so readers see either the old or the new document.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
