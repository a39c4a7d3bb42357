use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use deskpilot_core::domain::team::{Team, TeamId};

use super::{format_timestamp, RepositoryError, TeamRepository};
use crate::DbPool;

pub struct SqlTeamRepository {
    pool: DbPool,
}

impl SqlTeamRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TeamRepository for SqlTeamRepository {
    async fn list_active(&self) -> Result<Vec<Team>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, specialty_description, load_weight
            FROM teams
            WHERE active = 1
            ORDER BY name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(team_from_row).collect()
    }

    async fn save(&self, team: Team) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO teams (id, name, specialty_description, load_weight, active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                specialty_description = excluded.specialty_description,
                load_weight = excluded.load_weight
            "#,
        )
        .bind(&team.id.0)
        .bind(&team.name)
        .bind(&team.specialty_description)
        .bind(team.load_weight.max(0.0))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn team_from_row(row: &SqliteRow) -> Result<Team, RepositoryError> {
    Ok(Team {
        id: TeamId(row.try_get("id")?),
        name: row.try_get("name")?,
        specialty_description: row.try_get("specialty_description")?,
        load_weight: row.try_get::<f64, _>("load_weight")?.max(0.0),
    })
}

#[cfg(test)]
mod tests {
    use deskpilot_core::domain::team::Team;

    use super::SqlTeamRepository;
    use crate::repositories::TeamRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    #[tokio::test]
    async fn list_active_skips_inactive_and_orders_by_name() {
        let pool = setup_pool().await;
        let repo = SqlTeamRepository::new(pool.clone());

        repo.save(Team::new("t-2", "Redes").with_specialty("VPN, wifi, firewall"))
            .await
            .expect("save redes");
        repo.save(Team::new("t-1", "Infraestrutura").with_load_weight(2.0))
            .await
            .expect("save infra");
        repo.save(Team::new("t-3", "Legado")).await.expect("save legado");
        sqlx::query("UPDATE teams SET active = 0 WHERE id = 't-3'")
            .execute(&pool)
            .await
            .expect("deactivate");

        let teams = repo.list_active().await.expect("list");
        let names: Vec<&str> = teams.iter().map(|team| team.name.as_str()).collect();
        assert_eq!(names, vec!["Infraestrutura", "Redes"]);
        assert_eq!(teams[0].load_weight, 2.0);
        assert_eq!(teams[1].specialty_description, "VPN, wifi, firewall");
        pool.close().await;
    }

    #[tokio::test]
    async fn active_team_names_are_unique_case_insensitively() {
        let pool = setup_pool().await;
        let repo = SqlTeamRepository::new(pool.clone());

        repo.save(Team::new("t-1", "Triagem")).await.expect("save triagem");
        let duplicate = repo.save(Team::new("t-9", "TRIAGEM")).await;
        assert!(duplicate.is_err());
        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
