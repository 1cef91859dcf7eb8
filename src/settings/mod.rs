//! Application settings for the indicator itself, as opposed to the daemon
//! configuration resolved by [`crate::config`].

mod loader;
mod paths;
mod types;

pub use loader::{apply_env_overrides, load_from};
pub use paths::settings_path;
pub use types::Settings;
