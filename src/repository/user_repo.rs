//! User repository (数据库访问层)

use crate::{error::AppError, models::user::*};
use sqlx::PgPool;
use uuid::Uuid;

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 根据 ID 查找用户
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// 创建用户。encryption_salt 由 EncryptionService 生成，创建后不再变化。
    pub async fn create(
        &self,
        email: &str,
        display_name: &str,
        role: Role,
        encryption_salt: &str,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, display_name, role, is_active, encryption_salt)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(display_name)
        .bind(role)
        .bind(encryption_salt)
        .fetch_one(&self.db)
        .await?;

        Ok(user)
    }

    /// 查找用户的 PHI 加密盐
    pub async fn find_encryption_salt(&self, id: &Uuid) -> Result<Option<String>, AppError> {
        let salt: Option<(String,)> = sqlx::query_as(
            "SELECT encryption_salt FROM users WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(salt.map(|(s,)| s))
    }
}
