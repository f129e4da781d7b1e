pub mod loader;
pub mod types;

pub use loader::SettingsError;
pub use types::{LockSettings, Settings};
