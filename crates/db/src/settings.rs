//! Per-request settings snapshots.
//!
//! Settings are read fresh for every classification so operator edits apply
//! on the next request. A missing active row, or a row that cannot be decoded,
//! yields the built-in defaults rather than an error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use deskpilot_core::domain::settings::{AdvancedSettings, SettingsSnapshot};

use crate::repositories::{
    SettingsRepository, SqlSettingsRepository, SqlTeamRepository, TeamRepository,
};
use crate::DbPool;

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn snapshot(&self) -> SettingsSnapshot;
}

pub struct SqlSettingsProvider {
    settings: Arc<dyn SettingsRepository>,
    teams: Arc<dyn TeamRepository>,
}

impl SqlSettingsProvider {
    pub fn new(pool: DbPool) -> Self {
        Self {
            settings: Arc::new(SqlSettingsRepository::new(pool.clone())),
            teams: Arc::new(SqlTeamRepository::new(pool)),
        }
    }

    pub fn from_repositories(
        settings: Arc<dyn SettingsRepository>,
        teams: Arc<dyn TeamRepository>,
    ) -> Self {
        Self { settings, teams }
    }
}

#[async_trait]
impl SettingsProvider for SqlSettingsProvider {
    async fn snapshot(&self) -> SettingsSnapshot {
        let settings = match self.settings.load_active().await {
            Ok(Some(settings)) => settings,
            Ok(None) => AdvancedSettings::default(),
            Err(error) => {
                warn!(
                    event_name = "settings.load_failed",
                    error = %error,
                    "falling back to default advanced settings"
                );
                AdvancedSettings::default()
            }
        };

        let teams = match self.teams.list_active().await {
            Ok(teams) => teams,
            Err(error) => {
                warn!(
                    event_name = "settings.teams_load_failed",
                    error = %error,
                    "continuing with an empty team roster"
                );
                Vec::new()
            }
        };

        SettingsSnapshot::new(settings, teams)
    }
}

/// Fixed snapshot, for tests and offline CLI runs.
#[derive(Clone, Debug, Default)]
pub struct StaticSettingsProvider {
    snapshot: SettingsSnapshot,
}

impl StaticSettingsProvider {
    pub fn new(snapshot: SettingsSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl SettingsProvider for StaticSettingsProvider {
    async fn snapshot(&self) -> SettingsSnapshot {
        self.snapshot.clone()
    }
}
