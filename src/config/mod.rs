//! Resolution of the daemon's REST endpoint and API key.

mod loader;
mod paths;
mod types;
mod unit;

pub use loader::parse_gui;
pub use paths::parse_path_table;
pub use types::{Config, Endpoint};
pub use unit::install_unit;
