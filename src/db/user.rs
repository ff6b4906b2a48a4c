use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

/// Full user record. Contains the password hash, so it never leaves the
/// server; use [`User::to_public`] for responses.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub avatar: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub created_at: String,
}

/// User representation returned to clients and attached to requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub email_verified: bool,
    pub has_password: bool,
    pub google_linked: bool,
    pub created_at: String,
}

impl User {
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.uuid.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            avatar: self.avatar.clone(),
            email_verified: self.email_verified,
            has_password: self.password_hash.is_some(),
            google_linked: self.google_id.is_some(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Fields for inserting a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub google_id: Option<&'a str>,
    pub avatar: Option<&'a str>,
    pub email_verified: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    name: String,
    email: String,
    password_hash: Option<String>,
    google_id: Option<String>,
    avatar: Option<String>,
    role: String,
    email_verified: i32,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            google_id: row.google_id,
            avatar: row.avatar,
            role: UserRole::from_str(&row.role),
            email_verified: row.email_verified != 0,
            created_at: row.created_at,
        }
    }
}

macro_rules! select_user_where {
    ($cond:literal) => {
        concat!(
            "SELECT id, uuid, name, email, password_hash, google_id, avatar, role, email_verified, created_at FROM users WHERE ",
            $cond
        )
    };
}

/// Whether an error is a UNIQUE constraint violation (e.g. a racing insert
/// of the same email).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(e) => e.is_unique_violation(),
        _ => false,
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, name, email, password_hash, google_id, avatar, email_verified) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.uuid)
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.google_id)
        .bind(user.avatar)
        .bind(user.email_verified as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(select_user_where!("id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(select_user_where!("uuid = ?"))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(select_user_where!("email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by their Google account identifier.
    pub async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(select_user_where!("google_id = ?"))
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Attach a Google account to an existing user that has none yet.
    /// The provider has vouched for the email, so it is marked verified.
    pub async fn link_google(
        &self,
        id: i64,
        google_id: &str,
        avatar: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET google_id = ?, avatar = COALESCE(avatar, ?), email_verified = 1 WHERE id = ? AND google_id IS NULL",
        )
        .bind(google_id)
        .bind(avatar)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update name and/or email. A changed email loses its verified flag.
    pub async fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET
                name = COALESCE(?1, name),
                email_verified = CASE WHEN ?2 IS NOT NULL AND ?2 <> email THEN 0 ELSE email_verified END,
                email = COALESCE(?2, email)
             WHERE id = ?3",
        )
        .bind(name)
        .bind(email)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Check whether an email belongs to a user other than `id`.
    pub async fn is_email_taken_by_other(&self, email: &str, id: i64) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ? AND id <> ?")
            .bind(email)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Delete a user by ID. Outstanding tokens for the user stop verifying.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Total number of users.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    use super::*;

    fn local_user<'a>(uuid: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            uuid,
            name: "Alice",
            email,
            password_hash: Some("$argon2id$fake"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&local_user("uuid-123", "alice@example.com"))
            .await
            .unwrap();

        let user = db
            .users()
            .get_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.uuid, "uuid-123");
        assert_eq!(user.name, "Alice");
        assert_eq!(user.role, UserRole::User);
        assert!(!user.email_verified);
        assert!(user.google_id.is_none());

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.id, id);

        let user = db.users().get_by_uuid("uuid-123").await.unwrap().unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(&local_user("uuid-1", "alice@example.com"))
            .await
            .unwrap();

        let user = db.users().get_by_email("ALICE@Example.com").await.unwrap();
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create(&local_user("uuid-1", "alice@example.com"))
            .await
            .unwrap();
        let err = db
            .users()
            .create(&local_user("uuid-2", "Alice@example.com"))
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_link_google() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&local_user("uuid-1", "alice@example.com"))
            .await
            .unwrap();

        assert!(
            db.users()
                .link_google(id, "g-1", Some("https://img/a.png"))
                .await
                .unwrap()
        );
        // Already linked: no second link.
        assert!(!db.users().link_google(id, "g-2", None).await.unwrap());

        let user = db.users().get_by_google_id("g-1").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert!(user.email_verified);
        assert!(user.password_hash.is_some());
        assert_eq!(user.avatar.as_deref(), Some("https://img/a.png"));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&NewUser {
                email_verified: true,
                ..local_user("uuid-1", "alice@example.com")
            })
            .await
            .unwrap();

        db.users()
            .update_profile(id, Some("Alicia"), None)
            .await
            .unwrap();
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.name, "Alicia");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.email_verified);

        db.users()
            .update_profile(id, None, Some("alicia@example.com"))
            .await
            .unwrap();
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.name, "Alicia");
        assert_eq!(user.email, "alicia@example.com");
        assert!(!user.email_verified);
    }

    #[tokio::test]
    async fn test_email_taken_by_other() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db
            .users()
            .create(&local_user("uuid-1", "alice@example.com"))
            .await
            .unwrap();
        let bob = db
            .users()
            .create(&local_user("uuid-2", "bob@example.com"))
            .await
            .unwrap();

        let users = db.users();
        assert!(!users.is_email_taken_by_other("alice@example.com", alice).await.unwrap());
        assert!(users.is_email_taken_by_other("alice@example.com", bob).await.unwrap());
        assert!(!users.is_email_taken_by_other("carol@example.com", bob).await.unwrap());
    }

    #[tokio::test]
    async fn test_public_user_hides_secrets() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&local_user("uuid-1", "alice@example.com"))
            .await
            .unwrap();
        let user = db.users().get_by_id(id).await.unwrap().unwrap();

        let json = serde_json::to_value(user.to_public()).unwrap();
        assert_eq!(json["id"], "uuid-1");
        assert_eq!(json["hasPassword"], true);
        assert_eq!(json["googleLinked"], false);
        assert!(json.get("passwordHash").is_none());
        assert!(!json.to_string().contains("argon2"));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&local_user("uuid-123", "alice@example.com"))
            .await
            .unwrap();
        assert!(db.users().delete(id).await.unwrap());

        assert!(db.users().get_by_id(id).await.unwrap().is_none());
        assert_eq!(db.users().count().await.unwrap(), 0);
    }
}
