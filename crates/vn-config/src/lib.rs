//! Local configuration: the optional settings file and the builtin node set.

pub mod builtin;
pub mod settings;

pub use builtin::builtin_nodes;
pub use settings::{state_dir, Settings, SETTINGS_FILE};
