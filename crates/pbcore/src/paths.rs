//! Path helpers for running the Windows server binary under Wine.
//!
//! Handles:
//! - Converting Linux paths to the Wine `Z:` drive form the game expects
//! - Expanding `$VAR` / `${VAR}` references in configured paths

use std::path::Path;

/// Convert a Linux path to a Wine Z: drive path with Windows separators.
/// `/home/user/PB1` → `Z:\home\user\PB1`
/// Passes through paths that are already Windows-style or relative.
pub fn linux_to_wine(path: &str) -> String {
    if path.starts_with('/') {
        format!("Z:{}", path.replace('/', "\\"))
    } else {
        path.to_string()
    }
}

/// Convert a Wine Z: drive path back to a Linux path.
/// `Z:\home\user\PB1` → `/home/user/PB1`
pub fn wine_to_linux(path: &str) -> String {
    if path.starts_with("Z:\\")
        || path.starts_with("z:\\")
        || path.starts_with("Z:/")
        || path.starts_with("z:/")
    {
        path[2..].replace('\\', "/")
    } else {
        path.to_string()
    }
}

/// The altroot as the server binary needs to see it.
///
/// Under Wine this is the `Z:` form, on Windows the path is used unchanged.
pub fn altroot_for_game(altroot: &Path) -> String {
    let raw = altroot.display().to_string();
    if cfg!(windows) {
        raw
    } else {
        linux_to_wine(&raw)
    }
}

/// Expand `$VAR` and `${VAR}` references using the process environment.
///
/// Unknown variables are left untouched. `$HOME` falls back to the user's
/// home directory when the variable itself is unset. The result is trimmed.
pub fn expand_vars(input: &str) -> String {
    expand_vars_with(input, |name| {
        std::env::var(name).ok().or_else(|| {
            if name == "HOME" {
                dirs::home_dir().map(|h| h.display().to_string())
            } else {
                None
            }
        })
    })
}

/// Expand variables with a custom lookup.
pub fn expand_vars_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }

        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/pb".to_string()),
            "GAME" => Some("PB1".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_linux_to_wine() {
        assert_eq!(linux_to_wine("/home/pb/PBs/PB1"), "Z:\\home\\pb\\PBs\\PB1");
        // Non-Linux paths pass through
        assert_eq!(linux_to_wine("C:\\PBs\\PB1"), "C:\\PBs\\PB1");
        assert_eq!(linux_to_wine("relative/path"), "relative/path");
    }

    #[test]
    fn test_wine_to_linux() {
        assert_eq!(wine_to_linux("Z:\\home\\pb\\PB1"), "/home/pb/PB1");
        assert_eq!(wine_to_linux("z:/home/pb/PB1"), "/home/pb/PB1");
        assert_eq!(wine_to_linux("/home/pb/PB1"), "/home/pb/PB1");
    }

    #[cfg(unix)]
    #[test]
    fn test_altroot_for_game() {
        assert_eq!(
            altroot_for_game(Path::new("/srv/PBs/PB2")),
            "Z:\\srv\\PBs\\PB2"
        );
    }

    #[test]
    fn test_expand_vars() {
        assert_eq!(
            expand_vars_with("$HOME/Civ4/Beyond the Sword", fake_env),
            "/home/pb/Civ4/Beyond the Sword"
        );
        assert_eq!(
            expand_vars_with("${HOME}/PBs/${GAME}", fake_env),
            "/home/pb/PBs/PB1"
        );
        assert_eq!(expand_vars_with("  PB Mod_v7 \n", fake_env), "PB Mod_v7");
    }

    #[test]
    fn test_expand_vars_unknown_kept() {
        assert_eq!(expand_vars_with("$NOPE/x", fake_env), "$NOPE/x");
        assert_eq!(expand_vars_with("${NOPE}/x", fake_env), "${NOPE}/x");
        assert_eq!(expand_vars_with("cost $5", fake_env), "cost $5");
        assert_eq!(expand_vars_with("trailing $", fake_env), "trailing $");
        assert_eq!(expand_vars_with("${open", fake_env), "${open");
    }
}
