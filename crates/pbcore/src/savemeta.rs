//! Mod name stored in a save header.
//!
//! Beyond the Sword saves start with:
//!
//! ```text
//! u32 LE   save format version (ignored)
//! u32 LE   length of the mod name
//! [u8]     mod name, e.g. `Mods\PB Mod_v7\`
//! ```

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Longest mod name accepted before the header is considered garbage.
pub const MAX_MOD_NAME_LEN: u32 = 4096;

#[derive(Debug, Error)]
pub enum SaveMetaError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path:?} is truncated")]
    Truncated { path: PathBuf },
    #[error("{path:?} has an unrecognized header (mod name length {len})")]
    UnrecognizedHeader { path: PathBuf, len: u32 },
}

/// Source of the mod name a save was played with.
pub trait ModNameSource {
    fn mod_name(&self, save: &Path) -> Result<String, SaveMetaError>;
}

/// Reads the mod name from the save header on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaveHeader;

impl ModNameSource for SaveHeader {
    fn mod_name(&self, save: &Path) -> Result<String, SaveMetaError> {
        read_mod_name(save)
    }
}

/// Read the mod name from the header of `path`.
pub fn read_mod_name(path: &Path) -> Result<String, SaveMetaError> {
    let file = std::fs::File::open(path).map_err(|source| SaveMetaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_mod_name(io::BufReader::new(file), path)
}

/// Parse the mod name from a header stream. `path` is only used in errors.
pub fn parse_mod_name(mut reader: impl Read, path: &Path) -> Result<String, SaveMetaError> {
    let mut word = [0u8; 4];
    read_exact(&mut reader, &mut word, path)?; // version
    read_exact(&mut reader, &mut word, path)?;
    let len = u32::from_le_bytes(word);
    if len > MAX_MOD_NAME_LEN {
        return Err(SaveMetaError::UnrecognizedHeader {
            path: path.to_path_buf(),
            len,
        });
    }

    let mut name = vec![0u8; len as usize];
    read_exact(&mut reader, &mut name, path)?;
    Ok(String::from_utf8_lossy(&name).into_owned())
}

fn read_exact(reader: &mut impl Read, buf: &mut [u8], path: &Path) -> Result<(), SaveMetaError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SaveMetaError::Truncated {
                path: path.to_path_buf(),
            }
        } else {
            SaveMetaError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}
