//! User rows: typed filters, partial updates, and lookups by email.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use crate::domain::models::{Address, Role, User};
use crate::errors::{ApiError, ApiResult};
use crate::storage::{Db, Page, PageParams};

/// Insert payload. The id and timestamps are generated at insert time.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub address: Option<Address>,
    pub role: Role,
    pub is_active: bool,
    pub hashed_password: String,
}

/// Equality and range filters; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Partial patch; unset fields are preserved.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub is_active: Option<bool>,
    pub hashed_password: Option<String>,
}

impl UserChanges {
    fn is_empty(&self) -> bool {
        self.is_active.is_none() && self.hashed_password.is_none()
    }
}

/// Repository for user operations
#[derive(Clone)]
pub struct UserRepository {
    db: Db,
}

impl UserRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewUser) -> ApiResult<User> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let address_json = match &new.address {
            Some(address) => Some(
                serde_json::to_string(address)
                    .map_err(|e| ApiError::Internal(e.into()))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, first_name, last_name, phone_number, date_of_birth,
                address, role, is_active, hashed_password, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.phone_number)
        .bind(new.date_of_birth)
        .bind(&address_json)
        .bind(new.role)
        .bind(new.is_active)
        .bind(&new.hashed_password)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        Ok(User {
            id,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            phone_number: new.phone_number,
            date_of_birth: new.date_of_birth,
            address: new.address,
            role: new.role,
            is_active: new.is_active,
            hashed_password: new.hashed_password,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, id: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, first_name, last_name, phone_number, date_of_birth,
                   address, role, is_active, hashed_password, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(map_user))
    }

    pub async fn get_or_fail(&self, id: &str) -> ApiResult<User> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User with ID {id} not found")))
    }

    pub async fn find_one(&self, filter: &UserFilter) -> ApiResult<Option<User>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, email, first_name, last_name, phone_number, date_of_birth, \
             address, role, is_active, hashed_password, created_at, updated_at FROM users",
        );
        apply_filter(&mut query, filter);
        query.push(" LIMIT 1");

        let row = query.build().fetch_optional(self.db.pool()).await?;
        Ok(row.map(map_user))
    }

    pub async fn list(&self, filter: &UserFilter, page: &PageParams) -> ApiResult<Page<User>> {
        let page = page.clamped();

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, email, first_name, last_name, phone_number, date_of_birth, \
             address, role, is_active, hashed_password, created_at, updated_at FROM users",
        );
        apply_filter(&mut query, filter);
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ").push_bind(page.per_page);
        query.push(" OFFSET ").push_bind(page.offset());

        let rows = query.build().fetch_all(self.db.pool()).await?;
        let items = rows.into_iter().map(map_user).collect();
        let total_count = self.count(filter).await?;

        Ok(Page { items, total_count })
    }

    pub async fn update(&self, id: &str, changes: &UserChanges) -> ApiResult<User> {
        if changes.is_empty() {
            return self.get_or_fail(id).await;
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE users SET ");
        let mut parts = query.separated(", ");
        if let Some(is_active) = changes.is_active {
            parts.push("is_active = ").push_bind_unseparated(is_active);
        }
        if let Some(hashed_password) = &changes.hashed_password {
            parts
                .push("hashed_password = ")
                .push_bind_unseparated(hashed_password.clone());
        }
        parts.push("updated_at = ").push_bind_unseparated(Utc::now());
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(self.db.pool()).await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("User with ID {id} not found")));
        }

        self.get_or_fail(id).await
    }

    /// Deletes the user and, via the schema's cascade, their accounts.
    pub async fn delete(&self, id: &str) -> ApiResult<User> {
        let user = self.get_or_fail(id).await?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(user)
    }

    pub async fn count(&self, filter: &UserFilter) -> ApiResult<i64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM users");
        apply_filter(&mut query, filter);

        let row = query.build().fetch_one(self.db.pool()).await?;
        Ok(row.get("count"))
    }

    pub async fn exists(&self, filter: &UserFilter) -> ApiResult<bool> {
        Ok(self.find_one(filter).await?.is_some())
    }
}

fn apply_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &UserFilter) {
    let mut prefix = " WHERE ";
    if let Some(email) = &filter.email {
        query.push(prefix).push("email = ").push_bind(email.clone());
        prefix = " AND ";
    }
    if let Some(role) = filter.role {
        query.push(prefix).push("role = ").push_bind(role);
        prefix = " AND ";
    }
    if let Some(is_active) = filter.is_active {
        query.push(prefix).push("is_active = ").push_bind(is_active);
        prefix = " AND ";
    }
    if let Some(from) = filter.created_from {
        query.push(prefix).push("created_at >= ").push_bind(from);
        prefix = " AND ";
    }
    if let Some(to) = filter.created_to {
        query.push(prefix).push("created_at <= ").push_bind(to);
    }
}

fn map_user(row: sqlx::sqlite::SqliteRow) -> User {
    let address: Option<String> = row.get("address");
    User {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone_number: row.get("phone_number"),
        date_of_birth: row.get("date_of_birth"),
        address: address.and_then(|raw| serde_json::from_str(&raw).ok()),
        role: row.get("role"),
        is_active: row.get("is_active"),
        hashed_password: row.get("hashed_password"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
