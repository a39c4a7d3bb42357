pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod settings;

pub use connection::{connect, connect_with_settings, DbPool};
pub use settings::{SettingsProvider, SqlSettingsProvider, StaticSettingsProvider};
