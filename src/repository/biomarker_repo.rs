//! Biomarker repository (数据库访问层)

use crate::{error::AppError, models::biomarker::Biomarker};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct BiomarkerRepository {
    db: PgPool,
}

impl BiomarkerRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Biomarker>, AppError> {
        let biomarker = sqlx::query_as::<_, Biomarker>("SELECT * FROM biomarkers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(biomarker)
    }

    /// 按所有者列出，biomarker_type 可选过滤
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        biomarker_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Biomarker>, AppError> {
        let biomarkers = match biomarker_type {
            Some(kind) => {
                sqlx::query_as::<_, Biomarker>(
                    r#"
                    SELECT * FROM biomarkers
                    WHERE user_id = $1 AND biomarker_type = $2
                    ORDER BY recorded_at DESC LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(user_id)
                .bind(kind)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, Biomarker>(
                    r#"
                    SELECT * FROM biomarkers
                    WHERE user_id = $1
                    ORDER BY recorded_at DESC LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(biomarkers)
    }

    /// 创建记录；value_ciphertext 必须已由 EncryptionService 产生
    pub async fn create(
        &self,
        user_id: Uuid,
        biomarker_type: &str,
        value_ciphertext: &str,
        unit: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Biomarker, AppError> {
        let biomarker = sqlx::query_as::<_, Biomarker>(
            r#"
            INSERT INTO biomarkers (id, user_id, biomarker_type, value_ciphertext, unit, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(biomarker_type)
        .bind(value_ciphertext)
        .bind(unit)
        .bind(recorded_at)
        .fetch_one(&self.db)
        .await?;

        Ok(biomarker)
    }

    pub async fn update(
        &self,
        id: Uuid,
        value_ciphertext: Option<&str>,
        unit: Option<&str>,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Biomarker>, AppError> {
        let biomarker = sqlx::query_as::<_, Biomarker>(
            r#"
            UPDATE biomarkers
            SET
                value_ciphertext = COALESCE($2, value_ciphertext),
                unit = COALESCE($3, unit),
                recorded_at = COALESCE($4, recorded_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(value_ciphertext)
        .bind(unit)
        .bind(recorded_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(biomarker)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM biomarkers WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
