//! Audit repository (审计数据访问)
//!
//! 审计表是仅追加的：这里只有插入、只读查询和保留期删除，
//! 不存在任何更新路径。

use crate::{error::AppError, models::audit::*};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct AuditRepository {
    db: PgPool,
}

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 插入审计日志
    pub async fn insert_entry(&self, entry: &AuditEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, actor_user_id, actor_type, action, resource_type, resource_id,
                previous_value_ciphertext, new_value_ciphertext,
                ip_address, user_agent, session_id, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_user_id)
        .bind(entry.actor_type)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(&entry.previous_value_ciphertext)
        .bind(&entry.new_value_ciphertext)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.session_id)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询审计日志
    pub async fn query_entries(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let mut query = String::from("SELECT * FROM audit_logs WHERE 1=1");
        let mut index = 0;

        if filters.actor_user_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND actor_user_id = ${}", index));
        }
        if filters.resource_type.is_some() {
            index += 1;
            query.push_str(&format!(" AND resource_type = ${}", index));
        }
        if filters.resource_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND resource_id = ${}", index));
        }
        if filters.action.is_some() {
            index += 1;
            query.push_str(&format!(" AND action = ${}", index));
        }
        if filters.start_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at >= ${}", index));
        }
        if filters.end_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at <= ${}", index));
        }

        query.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            index + 1,
            index + 2
        ));

        let mut query_builder = sqlx::query_as::<_, AuditEntry>(&query);

        if let Some(actor_user_id) = filters.actor_user_id {
            query_builder = query_builder.bind(actor_user_id);
        }
        if let Some(resource_type) = &filters.resource_type {
            query_builder = query_builder.bind(resource_type);
        }
        if let Some(resource_id) = filters.resource_id {
            query_builder = query_builder.bind(resource_id);
        }
        if let Some(action) = &filters.action {
            query_builder = query_builder.bind(action);
        }
        if let Some(start_time) = filters.start_time {
            query_builder = query_builder.bind(start_time);
        }
        if let Some(end_time) = filters.end_time {
            query_builder = query_builder.bind(end_time);
        }

        let entries = query_builder
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        Ok(entries)
    }

    /// 统计审计日志数量
    pub async fn count_entries(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let mut query = String::from("SELECT COUNT(*) FROM audit_logs WHERE 1=1");
        let mut index = 0;

        if filters.actor_user_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND actor_user_id = ${}", index));
        }
        if filters.resource_type.is_some() {
            index += 1;
            query.push_str(&format!(" AND resource_type = ${}", index));
        }
        if filters.resource_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND resource_id = ${}", index));
        }
        if filters.action.is_some() {
            index += 1;
            query.push_str(&format!(" AND action = ${}", index));
        }
        if filters.start_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at >= ${}", index));
        }
        if filters.end_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at <= ${}", index));
        }

        let mut query_builder = sqlx::query(&query);

        if let Some(actor_user_id) = filters.actor_user_id {
            query_builder = query_builder.bind(actor_user_id);
        }
        if let Some(resource_type) = &filters.resource_type {
            query_builder = query_builder.bind(resource_type);
        }
        if let Some(resource_id) = filters.resource_id {
            query_builder = query_builder.bind(resource_id);
        }
        if let Some(action) = &filters.action {
            query_builder = query_builder.bind(action);
        }
        if let Some(start_time) = filters.start_time {
            query_builder = query_builder.bind(start_time);
        }
        if let Some(end_time) = filters.end_time {
            query_builder = query_builder.bind(end_time);
        }

        let count: i64 = query_builder.fetch_one(&self.db).await?.get(0);
        Ok(count)
    }

    /// 删除早于截止时间的日志，返回删除行数。
    /// 第二次以同一截止时间调用删除 0 行（幂等）。
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 按 ID 查找（合规调查用）
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AuditEntry>, AppError> {
        let entry = sqlx::query_as::<_, AuditEntry>("SELECT * FROM audit_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(entry)
    }
}
