use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use deskpilot_core::domain::priority::PriorityLevel;
use deskpilot_core::domain::settings::{
    AdvancedSettings, ModelSettings, PriorityMatrix, PriorityMatrixEntry,
};
use deskpilot_core::domain::team::TeamId;

use super::{format_timestamp, RepositoryError, SettingsRepository};
use crate::DbPool;

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn load_active(&self) -> Result<Option<AdvancedSettings>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                priority_matrix_json, emergency_keywords_json, load_balancing_enabled,
                team_load_weights_json, model_name, temperature, max_tokens, triage_team_id
            FROM advanced_settings
            WHERE active = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| settings_from_row(&r)).transpose()
    }

    async fn save_active(&self, settings: AdvancedSettings) -> Result<(), RepositoryError> {
        let matrix: BTreeMap<PriorityLevel, PriorityMatrixEntry> =
            settings.priority_matrix.into();
        let weights: BTreeMap<&str, f64> = settings
            .team_load_weights
            .iter()
            .map(|(team_id, weight)| (team_id.0.as_str(), *weight))
            .collect();

        let matrix_json = to_json("priority_matrix_json", &matrix)?;
        let keywords_json = to_json("emergency_keywords_json", &settings.emergency_keywords)?;
        let weights_json = to_json("team_load_weights_json", &weights)?;
        let id = format!("settings-{}", sqlx::types::Uuid::new_v4());

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE advanced_settings SET active = 0 WHERE active = 1")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO advanced_settings (
                id, active, priority_matrix_json, emergency_keywords_json,
                load_balancing_enabled, team_load_weights_json, model_name, temperature,
                max_tokens, triage_team_id, updated_at
            ) VALUES (?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(matrix_json)
        .bind(keywords_json)
        .bind(settings.load_balancing_enabled)
        .bind(weights_json)
        .bind(&settings.model_settings.model_name)
        .bind(f64::from(settings.model_settings.temperature))
        .bind(i64::from(settings.model_settings.max_tokens))
        .bind(settings.triage_team_id.as_ref().map(|team| team.0.as_str()))
        .bind(format_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }
}

fn to_json<T: serde::Serialize + ?Sized>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Decode(format!("could not encode `{column}`: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("invalid json in `{column}`: {e}")))
}

fn settings_from_row(row: &SqliteRow) -> Result<AdvancedSettings, RepositoryError> {
    let matrix_json: String = row.try_get("priority_matrix_json")?;
    let keywords_json: String = row.try_get("emergency_keywords_json")?;
    let weights_json: String = row.try_get("team_load_weights_json")?;
    let model_name: Option<String> = row.try_get("model_name")?;
    let temperature: Option<f64> = row.try_get("temperature")?;
    let max_tokens: Option<i64> = row.try_get("max_tokens")?;
    let triage_team_id: Option<String> = row.try_get("triage_team_id")?;

    let stored_matrix: BTreeMap<PriorityLevel, PriorityMatrixEntry> =
        from_json("priority_matrix_json", &matrix_json)?;
    let weights: HashMap<String, f64> = from_json("team_load_weights_json", &weights_json)?;

    let defaults = ModelSettings::default();
    let model_settings = ModelSettings {
        model_name: model_name.filter(|name| !name.trim().is_empty()).unwrap_or(defaults.model_name),
        temperature: temperature.map(|value| value as f32).unwrap_or(defaults.temperature),
        max_tokens: max_tokens
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value > 0)
            .unwrap_or(defaults.max_tokens),
    };

    Ok(AdvancedSettings {
        priority_matrix: PriorityMatrix::from_partial(stored_matrix),
        emergency_keywords: from_json("emergency_keywords_json", &keywords_json)?,
        load_balancing_enabled: row.try_get("load_balancing_enabled")?,
        team_load_weights: weights
            .into_iter()
            .map(|(team_id, weight)| (TeamId(team_id), weight.max(0.0)))
            .collect(),
        model_settings,
        triage_team_id: triage_team_id.filter(|id| !id.trim().is_empty()).map(TeamId),
    })
}

#[cfg(test)]
mod tests {
    use deskpilot_core::domain::priority::PriorityLevel;
    use deskpilot_core::domain::settings::AdvancedSettings;
    use deskpilot_core::domain::team::TeamId;

    use super::SqlSettingsRepository;
    use crate::repositories::SettingsRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    #[tokio::test]
    async fn missing_active_row_loads_as_none() {
        let pool = setup_pool().await;
        let repo = SqlSettingsRepository::new(pool.clone());

        assert!(repo.load_active().await.expect("load").is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn save_active_round_trips_and_replaces_previous_row() {
        let pool = setup_pool().await;
        let repo = SqlSettingsRepository::new(pool.clone());

        let mut settings = AdvancedSettings {
            emergency_keywords: vec!["sistema caiu".to_string(), "fora do ar".to_string()],
            load_balancing_enabled: true,
            triage_team_id: Some(TeamId("t-triage".to_string())),
            ..AdvancedSettings::default()
        };
        settings.team_load_weights.insert(TeamId("t-1".to_string()), 1.5);
        repo.save_active(settings.clone()).await.expect("save first");

        settings.emergency_keywords = vec!["incêndio".to_string()];
        repo.save_active(settings.clone()).await.expect("save second");

        let loaded = repo.load_active().await.expect("load").expect("active row");
        assert_eq!(loaded, settings);

        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM advanced_settings WHERE active = 1")
                .fetch_one(&pool)
                .await
                .expect("count active");
        assert_eq!(active, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn partially_stored_matrix_is_completed_on_load() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO advanced_settings (id, active, priority_matrix_json, updated_at)
             VALUES ('s-partial', 1, ?, '2026-01-01T00:00:00.000Z')",
        )
        .bind(r#"{"crisis":{"urgency_label":"Extrema","impact_label":"Total","sla_minutes":10}}"#)
        .execute(&pool)
        .await
        .expect("insert partial settings");

        let loaded = SqlSettingsRepository::new(pool.clone())
            .load_active()
            .await
            .expect("load")
            .expect("active row");

        assert_eq!(loaded.priority_matrix.iter().count(), 5);
        assert_eq!(loaded.priority_matrix.entry(PriorityLevel::Crisis).sla_minutes, 10);
        assert_eq!(loaded.priority_matrix.entry(PriorityLevel::Medium).sla_minutes, 480);
        assert_eq!(loaded.model_settings, Default::default());
        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
