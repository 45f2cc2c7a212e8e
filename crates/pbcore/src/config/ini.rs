//! Line-preserving INI parser/writer for the game's `CivilizationIV.ini`.
//!
//! The game writes a plain INI file:
//! - Sections in `[brackets]` (the options live under `[CONFIG]`)
//! - Keys with `=` separator, values unquoted
//! - Comments start with `;` or `#`
//!
//! Only values that are explicitly changed are rewritten; comments, blank
//! lines, ordering and the file's line ending style are kept.

use std::path::Path;

use super::write_atomic;

/// Line-preserving INI document. Comments and blank lines are written back
/// in the order they were read.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    /// Sections in order. Empty name = global (no section header).
    pub sections: Vec<IniSection>,
    /// Line terminator used when writing (`"\r\n"` if the source used it).
    pub line_ending: LineEnding,
}

#[derive(Debug, Clone)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<IniEntry>,
}

#[derive(Debug, Clone)]
pub enum IniEntry {
    Comment(String),
    KeyValue { key: String, value: String },
    Blank,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl IniFile {
    /// Parse `content`, remembering its line ending.
    pub fn parse(content: &str) -> Self {
        let line_ending = if content.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };

        let mut sections = Vec::new();
        let mut current_section = IniSection {
            name: String::new(),
            entries: Vec::new(),
        };

        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                current_section.entries.push(IniEntry::Blank);
            } else if trimmed.starts_with(';') || trimmed.starts_with('#') {
                current_section
                    .entries
                    .push(IniEntry::Comment(trimmed.to_string()));
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                sections.push(current_section);
                current_section = IniSection {
                    name: trimmed[1..trimmed.len() - 1].to_string(),
                    entries: Vec::new(),
                };
            } else if let Some(eq_pos) = trimmed.find('=') {
                let key = trimmed[..eq_pos].trim().to_string();
                let value = trimmed[eq_pos + 1..].trim().to_string();
                current_section
                    .entries
                    .push(IniEntry::KeyValue { key, value });
            } else {
                current_section
                    .entries
                    .push(IniEntry::Comment(trimmed.to_string()));
            }
        }

        sections.push(current_section);
        IniFile {
            sections,
            line_ending,
        }
    }

    /// Read `path`; invalid UTF-8 is replaced rather than rejected.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        // The game writes the file in the system codepage; keep whatever
        // isn't UTF-8 readable instead of refusing the file.
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Serialize with the line ending style of the source.
    pub fn write_to_string(&self) -> String {
        let eol = self.line_ending.as_str();
        let mut out = String::new();
        for section in &self.sections {
            if !section.name.is_empty() {
                out.push('[');
                out.push_str(&section.name);
                out.push(']');
                out.push_str(eol);
            } else if section.entries.is_empty() {
                continue;
            }
            for entry in &section.entries {
                match entry {
                    IniEntry::Comment(c) => out.push_str(c),
                    IniEntry::KeyValue { key, value } => {
                        out.push_str(key);
                        out.push('=');
                        out.push_str(value);
                    }
                    IniEntry::Blank => {}
                }
                out.push_str(eol);
            }
        }
        out
    }

    /// Write the INI file to disk, replacing it in one step.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        write_atomic(path, self.write_to_string().as_bytes())?;
        Ok(())
    }

    /// Value of `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.find_section(section).and_then(|s| {
            s.entries.iter().find_map(|e| match e {
                IniEntry::KeyValue { key: k, value } if k == key => Some(value.as_str()),
                _ => None,
            })
        })
    }

    /// Get the first value for `key`, whatever section it is in.
    pub fn find(&self, key: &str) -> Option<&str> {
        self.sections.iter().find_map(|s| {
            s.entries.iter().find_map(|e| match e {
                IniEntry::KeyValue { key: k, value } if k == key => Some(value.as_str()),
                _ => None,
            })
        })
    }

    /// Replace the value of every occurrence of `key`, in any section.
    /// Returns the number of entries changed.
    pub fn replace_all(&mut self, key: &str, value: &str) -> usize {
        let mut changed = 0;
        for section in &mut self.sections {
            for entry in &mut section.entries {
                if let IniEntry::KeyValue { key: k, value: v } = entry {
                    if k == key {
                        *v = value.to_string();
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Set `key` in `section`, appending the section or key when absent.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let sec = self.find_or_create_section(section);
        for entry in sec.entries.iter_mut() {
            if let IniEntry::KeyValue { key: k, value: v } = entry {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
        }
        sec.entries.push(IniEntry::KeyValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    fn find_section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn find_or_create_section(&mut self, name: &str) -> &mut IniSection {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(IniSection {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = "[CONFIG]\r\nPitbossSMTPLogin=Z:\\home\\pb\\PB1\r\nScreenWidth=640\r\n";
        let ini = IniFile::parse(content);
        assert_eq!(ini.get("CONFIG", "PitbossSMTPLogin"), Some("Z:\\home\\pb\\PB1"));
        assert_eq!(ini.get("CONFIG", "ScreenWidth"), Some("640"));
        assert_eq!(ini.line_ending, LineEnding::CrLf);
    }

    #[test]
    fn test_roundtrip_crlf() {
        let content = "\r\n[CONFIG]\r\n\r\n; Pitboss login\r\nPitbossSMTPLogin=\r\nScreenWidth=640\r\n";
        let ini = IniFile::parse(content);
        assert_eq!(ini.write_to_string(), content);
    }

    #[test]
    fn test_roundtrip_lf() {
        let content = "[CONFIG]\n# comment\nFullScreen=0\n\n[OTHER]\nkey=val\n";
        let ini = IniFile::parse(content);
        assert_eq!(ini.write_to_string(), content);
    }

    #[test]
    fn test_find_and_replace_all() {
        let mut ini = IniFile::parse("[CONFIG]\nA=1\nB=2\n[EXTRA]\nA=3\n");
        assert_eq!(ini.find("A"), Some("1"));
        assert_eq!(ini.find("missing"), None);
        assert_eq!(ini.replace_all("A", "9"), 2);
        assert_eq!(ini.get("CONFIG", "A"), Some("9"));
        assert_eq!(ini.get("EXTRA", "A"), Some("9"));
        assert_eq!(ini.get("CONFIG", "B"), Some("2"));
    }

    #[test]
    fn test_set_creates_section() {
        let mut ini = IniFile::default();
        ini.set("CONFIG", "PitbossSMTPLogin", "Z:\\pb");
        assert_eq!(ini.get("CONFIG", "PitbossSMTPLogin"), Some("Z:\\pb"));
        assert_eq!(ini.write_to_string(), "[CONFIG]\nPitbossSMTPLogin=Z:\\pb\n");
    }

    #[test]
    fn test_write_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("CivilizationIV.ini");
        let mut ini = IniFile::parse("[CONFIG]\r\nA=1\r\n");
        ini.set("CONFIG", "A", "2");
        ini.write(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[CONFIG]\r\nA=2\r\n");
    }
}
