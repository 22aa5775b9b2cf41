//! One-time passcode rows. The unique email column guarantees at most one
//! code per address; issuing a new code first deletes whatever is there.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::models::Otp;
use crate::errors::ApiResult;
use crate::storage::Db;

#[derive(Debug, Clone)]
pub struct NewOtp {
    pub email: String,
    pub otp_code: String,
    pub expires_on: DateTime<Utc>,
}

/// Repository for OTP operations
#[derive(Clone)]
pub struct OtpRepository {
    db: Db,
}

impl OtpRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewOtp) -> ApiResult<Otp> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO otps (id, email, otp_code, expires_on, is_expired, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.email)
        .bind(&new.otp_code)
        .bind(new.expires_on)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        Ok(Otp {
            id,
            email: new.email,
            otp_code: new.otp_code,
            expires_on: new.expires_on,
            is_expired: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_email(&self, email: &str) -> ApiResult<Option<Otp>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, otp_code, expires_on, is_expired, created_at, updated_at
            FROM otps
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|r| Otp {
            id: r.get("id"),
            email: r.get("email"),
            otp_code: r.get("otp_code"),
            expires_on: r.get("expires_on"),
            is_expired: r.get("is_expired"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Lazy expiry: flips every live code for the address to expired.
    pub async fn expire_all_for_email(&self, email: &str) -> ApiResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE otps SET is_expired = 1, updated_at = ? WHERE email = ? AND is_expired = 0
            "#,
        )
        .bind(Utc::now())
        .bind(email)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM otps WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clears any code (live or expired) for the address, making room for a
    /// fresh one.
    pub async fn delete_by_email(&self, email: &str) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM otps WHERE email = ?")
            .bind(email)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
