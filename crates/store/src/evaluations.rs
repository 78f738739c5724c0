use agentcanvas_core::entity::{EvaluationResult, NewEvaluationResult};
use agentcanvas_core::error::StoreError;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::rows::{self, db, not_found};
use crate::{Page, SqliteStore};

const COLUMNS: &str = "id, conversation_id, evaluator_id, metrics, score, feedback, created_at";

fn row_to_evaluation(row: &SqliteRow) -> Result<EvaluationResult, StoreError> {
    Ok(EvaluationResult {
        id: rows::uuid(row, "id")?,
        conversation_id: rows::uuid(row, "conversation_id")?,
        evaluator_id: rows::opt_text(row, "evaluator_id")?,
        metrics: rows::json_map(row, "metrics")?,
        score: row
            .try_get("score")
            .map_err(|e| StoreError::Corrupt(format!("score column: {e}")))?,
        feedback: rows::opt_text(row, "feedback")?,
        created_at: rows::time(row, "created_at")?,
    })
}

impl SqliteStore {
    pub async fn create_evaluation(&self, new: NewEvaluationResult) -> Result<EvaluationResult, StoreError> {
        self.require_conversation(new.conversation_id).await?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO evaluation_results (id, conversation_id, evaluator_id, metrics, score, feedback, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(id.to_string())
        .bind(new.conversation_id.to_string())
        .bind(&new.evaluator_id)
        .bind(rows::to_json(&new.metrics)?)
        .bind(new.score)
        .bind(&new.feedback)
        .bind(rows::now())
        .execute(&self.pool)
        .await
        .map_err(db("insert evaluation"))?;

        self.require_evaluation(id).await
    }

    pub async fn find_evaluation(&self, id: Uuid) -> Result<Option<EvaluationResult>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM evaluation_results WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("select evaluation"))?;
        row.as_ref().map(row_to_evaluation).transpose()
    }

    pub async fn require_evaluation(&self, id: Uuid) -> Result<EvaluationResult, StoreError> {
        self.find_evaluation(id)
            .await?
            .ok_or_else(|| not_found("evaluation result", id))
    }

    pub async fn list_evaluations(
        &self,
        conversation_id: Uuid,
        page: Page,
    ) -> Result<Vec<EvaluationResult>, StoreError> {
        let found = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM evaluation_results
            WHERE conversation_id = ?1
            ORDER BY created_at, seq
            LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(conversation_id.to_string())
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("list evaluations"))?;
        found.iter().map(row_to_evaluation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn evaluation_round_trip() {
        let store = store().await;
        let conv = conversation(&store).await;
        let created = store
            .create_evaluation(NewEvaluationResult {
                conversation_id: conv.id,
                evaluator_id: Some("rubric-v1".into()),
                metrics: serde_json::json!({"helpfulness": 4}).as_object().cloned().unwrap(),
                score: Some(0.8),
                feedback: None,
            })
            .await
            .unwrap();

        let listed = store.list_evaluations(conv.id, Page::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].score, Some(0.8));
        assert_eq!(listed[0].metrics["helpfulness"], 4);
    }

    #[tokio::test]
    async fn evaluation_for_missing_conversation_is_not_found() {
        let store = store().await;
        let err = store
            .create_evaluation(NewEvaluationResult {
                conversation_id: Uuid::new_v4(),
                evaluator_id: None,
                metrics: Default::default(),
                score: None,
                feedback: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
