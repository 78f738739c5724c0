use agentcanvas_core::entity::{NewTeam, Team, TeamMember, TeamUpdate};
use agentcanvas_core::error::StoreError;
use sqlx::sqlite::SqliteRow;
use tracing::debug;
use uuid::Uuid;

use crate::rows::{self, db, not_found};
use crate::{Page, SqliteStore};

const COLUMNS: &str = "id, name, description, config, created_at, updated_at";

fn row_to_team(row: &SqliteRow) -> Result<Team, StoreError> {
    Ok(Team {
        id: rows::uuid(row, "id")?,
        name: rows::text(row, "name")?,
        description: rows::opt_text(row, "description")?,
        config: rows::json_map(row, "config")?,
        created_at: rows::time(row, "created_at")?,
        updated_at: rows::opt_time(row, "updated_at")?,
    })
}

fn row_to_member(row: &SqliteRow) -> Result<TeamMember, StoreError> {
    Ok(TeamMember {
        team_id: rows::uuid(row, "team_id")?,
        agent_id: rows::uuid(row, "agent_id")?,
        role: rows::opt_text(row, "role")?,
        joined_at: rows::time(row, "joined_at")?,
    })
}

impl SqliteStore {
    pub async fn create_team(&self, new: NewTeam) -> Result<Team, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO teams (id, name, description, config, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(&new.description)
        .bind(rows::to_json(&new.config)?)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(db("insert team"))?;

        debug!(team_id = %id, name = %new.name, "Created team");
        self.require_team(id).await
    }

    pub async fn find_team(&self, id: Uuid) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM teams WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("select team"))?;
        row.as_ref().map(row_to_team).transpose()
    }

    pub async fn require_team(&self, id: Uuid) -> Result<Team, StoreError> {
        self.find_team(id).await?.ok_or_else(|| not_found("team", id))
    }

    pub async fn list_teams(&self, page: Page) -> Result<Vec<Team>, StoreError> {
        let found = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM teams ORDER BY created_at, id LIMIT ?1 OFFSET ?2"
        ))
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("list teams"))?;
        found.iter().map(row_to_team).collect()
    }

    pub async fn update_team(&self, id: Uuid, update: TeamUpdate) -> Result<Team, StoreError> {
        let mut team = self.require_team(id).await?;
        if let Some(name) = update.name {
            team.name = name;
        }
        if update.description.is_some() {
            team.description = update.description;
        }
        if let Some(config) = update.config {
            team.config = config;
        }

        sqlx::query("UPDATE teams SET name = ?2, description = ?3, config = ?4, updated_at = ?5 WHERE id = ?1")
            .bind(id.to_string())
            .bind(&team.name)
            .bind(&team.description)
            .bind(rows::to_json(&team.config)?)
            .bind(rows::now())
            .execute(&self.pool)
            .await
            .map_err(db("update team"))?;

        self.require_team(id).await
    }

    pub async fn delete_team(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM teams WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db("delete team"))?;
        if result.rows_affected() == 0 {
            return Err(not_found("team", id));
        }
        Ok(())
    }

    /// Add an agent to a team. Re-adding an existing member updates its role.
    pub async fn add_team_agent(
        &self,
        team_id: Uuid,
        agent_id: Uuid,
        role: Option<String>,
    ) -> Result<TeamMember, StoreError> {
        self.require_team(team_id).await?;
        self.require_agent(agent_id).await?;

        sqlx::query(
            r#"
            INSERT INTO team_agents (team_id, agent_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(team_id, agent_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(team_id.to_string())
        .bind(agent_id.to_string())
        .bind(&role)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(db("insert team member"))?;

        let row = sqlx::query(
            "SELECT team_id, agent_id, role, joined_at FROM team_agents WHERE team_id = ?1 AND agent_id = ?2",
        )
        .bind(team_id.to_string())
        .bind(agent_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db("select team member"))?;
        row_to_member(&row)
    }

    pub async fn remove_team_agent(&self, team_id: Uuid, agent_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM team_agents WHERE team_id = ?1 AND agent_id = ?2")
            .bind(team_id.to_string())
            .bind(agent_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db("delete team member"))?;
        if result.rows_affected() == 0 {
            return Err(not_found("team member", agent_id));
        }
        Ok(())
    }

    /// Members of a team, in the order they joined.
    pub async fn list_team_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, StoreError> {
        let found = sqlx::query(
            "SELECT team_id, agent_id, role, joined_at FROM team_agents WHERE team_id = ?1 ORDER BY joined_at, seq",
        )
        .bind(team_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db("list team members"))?;
        found.iter().map(row_to_member).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use agentcanvas_core::entity::NewTeam;
    use agentcanvas_core::error::StoreError;
    use uuid::Uuid;

    fn new_team(name: &str) -> NewTeam {
        NewTeam {
            name: name.into(),
            description: None,
            config: Default::default(),
        }
    }

    #[tokio::test]
    async fn members_are_listed_in_join_order() {
        let store = store().await;
        let team = store.create_team(new_team("Support")).await.unwrap();
        let first = agent(&store, "Triage").await;
        let second = agent(&store, "Specialist").await;

        store.add_team_agent(team.id, first.id, Some("lead".into())).await.unwrap();
        store.add_team_agent(team.id, second.id, None).await.unwrap();

        let members = store.list_team_members(team.id).await.unwrap();
        let ids: Vec<Uuid> = members.iter().map(|m| m.agent_id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(members[0].role.as_deref(), Some("lead"));
    }

    #[tokio::test]
    async fn re_adding_member_updates_role() {
        let store = store().await;
        let team = store.create_team(new_team("Ops")).await.unwrap();
        let a = agent(&store, "Oncall").await;

        store.add_team_agent(team.id, a.id, None).await.unwrap();
        let member = store.add_team_agent(team.id, a.id, Some("backup".into())).await.unwrap();

        assert_eq!(member.role.as_deref(), Some("backup"));
        assert_eq!(store.list_team_members(team.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn adding_unknown_agent_is_not_found() {
        let store = store().await;
        let team = store.create_team(new_team("Empty")).await.unwrap();
        let err = store.add_team_agent(team.id, Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "agent", .. }));
    }

    #[tokio::test]
    async fn deleting_team_drops_membership() {
        let store = store().await;
        let team = store.create_team(new_team("Gone")).await.unwrap();
        let a = agent(&store, "Member").await;
        store.add_team_agent(team.id, a.id, None).await.unwrap();

        store.delete_team(team.id).await.unwrap();
        assert!(store.list_team_members(team.id).await.unwrap().is_empty());
        assert!(store.find_agent(a.id).await.unwrap().is_some());
    }
}
