use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The public face of an actor, stored in the `users` table. The username is the
/// unique handle used by profile URLs; it never changes after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// UserCredentials
///
/// Internal row used by the login flow. Carries the Argon2 PHC hash, so it is
/// deliberately not `Serialize` and never leaves the server.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserCredentials> for User {
    fn from(credentials: UserCredentials) -> Self {
        User {
            id: credentials.id,
            username: credentials.username,
            created_at: credentials.created_at,
        }
    }
}

/// Article
///
/// A blog post from the `articles` table, joined with the author's username.
/// `author_id` and `created_at` are written once by the insert and no update
/// statement touches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub author_id: Uuid,
    // Loaded via a JOIN on `users`.
    pub author_username: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Article {
    pub fn is_authored_by(&self, user_id: Uuid) -> bool {
        self.author_id == user_id
    }
}

/// Comment
///
/// A comment record from the `comments` table, augmented with the author's
/// username (a join operation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub author_id: Uuid,
    pub author_username: String,
    pub body: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}
