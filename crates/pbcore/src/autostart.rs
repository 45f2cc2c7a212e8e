//! Whether a server may be started unattended.
//!
//! `autostart` enables it directly. A headless server (`noGui`) with remote
//! shell control (`shell.enable`) can't be confirmed by anyone at the
//! console, so that combination turns autostart on as well.

use crate::config::settings::SettingsRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Autostart {
    Disabled,
    Enabled,
    /// `autostart` is off, but `noGui` and `shell.enable` are both on
    ForcedByHeadless,
}

impl Autostart {
    pub fn is_enabled(self) -> bool {
        !matches!(self, Autostart::Disabled)
    }
}

/// Evaluate the autostart rule without side effects.
pub fn autostart_mode(settings: &SettingsRecord) -> Autostart {
    if settings.autostart() {
        Autostart::Enabled
    } else if settings.no_gui() && settings.shell_enabled() {
        Autostart::ForcedByHeadless
    } else {
        Autostart::Disabled
    }
}

/// Evaluate the autostart rule, warning when headless mode forces it.
pub fn should_autostart(settings: &SettingsRecord) -> bool {
    let mode = autostart_mode(settings);
    if mode == Autostart::ForcedByHeadless {
        tracing::warn!("Autostart flag is disabled, but noGui and shell flag overrides the setting.");
    }
    mode.is_enabled()
}

/// Save name/pattern to load when no override is given.
pub fn autostart_filename(settings: &SettingsRecord) -> Option<&str> {
    settings.save_filename()
}
