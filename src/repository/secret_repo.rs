//! System secret repository (系统密钥数据访问)

use crate::{error::AppError, models::audit::SystemSecret};
use sqlx::PgPool;

pub struct SecretRepository {
    db: PgPool,
}

impl SecretRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// get-or-create：依赖 key 上的唯一约束。
    /// 并发首次使用时竞争失败的一方插入 0 行，随后重读赢家持久化的值，
    /// 竞争永远不会以错误形式暴露给调用方。
    pub async fn get_or_create(&self, key: &str, value: &str) -> Result<SystemSecret, AppError> {
        sqlx::query(
            r#"
            INSERT INTO system_secrets (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;

        let secret = sqlx::query_as::<_, SystemSecret>(
            "SELECT * FROM system_secrets WHERE key = $1",
        )
        .bind(key)
        .fetch_one(&self.db)
        .await?;

        Ok(secret)
    }

    pub async fn find(&self, key: &str) -> Result<Option<SystemSecret>, AppError> {
        let secret = sqlx::query_as::<_, SystemSecret>(
            "SELECT * FROM system_secrets WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        Ok(secret)
    }
}
