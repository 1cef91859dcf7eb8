//! Observable folders and devices mirrored from the daemon.

mod collection;
mod device;
mod folder;
mod item;

use std::fmt;

pub use collection::{CollectionEvent, ItemCollection, WeakItemCollection};
pub use device::Device;
pub use folder::Folder;
pub use item::{Item, ItemCore};
pub(crate) use item::lock;

/// Delay before an item publishes its latest state.
pub const STATE_EMIT_DELAY: std::time::Duration = std::time::Duration::from_millis(200);

/// Delay before a device recomputes its aggregate state.
pub const DETERMINE_STATE_DELAY: std::time::Duration = std::time::Duration::from_millis(600);

/// Coarse state shared by folders and devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Unknown,
    Idle,
    Scanning,
    Syncing,
    Paused,
    Erroneous,
    Disconnected,
}

impl State {
    /// Maps a folder state string reported by the daemon onto a [`State`].
    /// Returns `None` for empty or unrecognised values.
    pub fn from_daemon(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }

        match normalized.as_str() {
            "idle" => return Some(State::Idle),
            "scanning" => return Some(State::Scanning),
            "syncing" => return Some(State::Syncing),
            "error" | "erroneous" => return Some(State::Erroneous),
            "paused" => return Some(State::Paused),
            "unknown" => return Some(State::Unknown),
            _ => {}
        }

        if normalized.contains("scan") {
            return Some(State::Scanning);
        }
        if normalized.contains("sync") || normalized.contains("clean") {
            return Some(State::Syncing);
        }
        None
    }

    pub fn is_busy(self) -> bool {
        matches!(self, State::Syncing | State::Scanning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Unknown => "unknown",
            State::Idle => "idle",
            State::Scanning => "scanning",
            State::Syncing => "syncing",
            State::Paused => "paused",
            State::Erroneous => "erroneous",
            State::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications published by a single folder or device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    StateChange(State),
    NameChange(String),
    Destroy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_states_map_onto_coarse_states() {
        assert_eq!(State::from_daemon("idle"), Some(State::Idle));
        assert_eq!(State::from_daemon("scan-waiting"), Some(State::Scanning));
        assert_eq!(State::from_daemon("sync-preparing"), Some(State::Syncing));
        assert_eq!(State::from_daemon("clean-waiting"), Some(State::Syncing));
        assert_eq!(State::from_daemon("error"), Some(State::Erroneous));
        assert_eq!(State::from_daemon(""), None);
        assert_eq!(State::from_daemon("bogus"), None);
    }
}
