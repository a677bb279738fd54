use crate::forms::{NewArticle, NewComment};
use crate::models::{Article, Comment, User, UserCredentials};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// RepositoryError
///
/// Failures reported by the persistence layer. Constraint violations are split
/// out so callers can turn them into form errors instead of a 500.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A unique constraint was violated (e.g. a username already taken).
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// A foreign key pointed at a row that does not exist.
    #[error("Referenced row does not exist: {0}")]
    MissingReference(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            // PostgreSQL: 23505 unique_violation, 23503 foreign_key_violation.
            match db_err.code().as_deref() {
                Some("23505") => return RepositoryError::Conflict(constraint),
                Some("23503") => return RepositoryError::MissingReference(constraint),
                _ => {}
            }
        }
        RepositoryError::Database(err)
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this
/// trait, so the PostgreSQL implementation can be swapped for the in-memory one
/// in tests.
///
/// Relationships are explicit queries: an article's comments come from
/// `comments_for_article`, an author's articles from `articles_by_author`.
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn Repository>`) shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, username: &str, password_hash: &str) -> RepositoryResult<User>;
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;
    // Login only: includes the password hash.
    async fn find_credentials(&self, username: &str) -> RepositoryResult<Option<UserCredentials>>;

    // --- Articles (newest first everywhere) ---
    async fn count_articles(&self) -> RepositoryResult<i64>;
    async fn list_articles(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Article>>;
    async fn articles_by_author(&self, author_id: Uuid) -> RepositoryResult<Vec<Article>>;
    async fn get_article(&self, id: i64) -> RepositoryResult<Option<Article>>;
    async fn create_article(&self, author_id: Uuid, article: NewArticle) -> RepositoryResult<Article>;
    // Only title and body are writable; the author never changes.
    async fn update_article(&self, id: i64, changes: NewArticle) -> RepositoryResult<Option<Article>>;
    // Cascades to the article's comments. Returns false if nothing was deleted.
    async fn delete_article(&self, id: i64) -> RepositoryResult<bool>;

    // --- Comments (oldest first) ---
    async fn create_comment(
        &self,
        article_id: i64,
        author_id: Uuid,
        comment: NewComment,
    ) -> RepositoryResult<Comment>;
    async fn comments_for_article(&self, article_id: i64) -> RepositoryResult<Vec<Comment>>;

    // --- Sessions ---
    /// Records a new login for `user_id`, valid until `expires_at`. Returns the session id.
    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> RepositoryResult<Uuid>;
    /// The owner of a live (unexpired, not revoked) session.
    async fn session_user(&self, session_id: Uuid) -> RepositoryResult<Option<User>>;
    // Returns false if the session was already gone.
    async fn delete_session(&self, session_id: Uuid) -> RepositoryResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ARTICLE_COLUMNS: &str = r#"
    SELECT a.id, a.title, a.body, a.author_id, u.username AS author_username, a.created_at
    FROM articles a
    JOIN users u ON u.id = a.author_id
"#;

const COMMENT_COLUMNS: &str = r#"
    SELECT c.id, c.article_id, c.author_id, u.username AS author_username, c.body, c.created_at
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

#[async_trait]
impl Repository for PostgresRepository {
    /// create_user
    ///
    /// A taken username surfaces as `RepositoryError::Conflict("uq_users_username")`.
    async fn create_user(&self, username: &str, password_hash: &str) -> RepositoryResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    /// get_user
    ///
    /// Used by the `x-user-id` development bypass. Never selects the hash.
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// find_credentials
    ///
    /// The only query that reads `password_hash`. Usernames compare exactly
    /// (case-sensitive), like the unique constraint.
    async fn find_credentials(&self, username: &str) -> RepositoryResult<Option<UserCredentials>> {
        let credentials = sqlx::query_as::<_, UserCredentials>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credentials)
    }

    async fn count_articles(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// list_articles
    ///
    /// One page of the global listing. `id` breaks ties between rows created in
    /// the same instant so pages never overlap.
    async fn list_articles(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Article>> {
        let query = format!(
            "{ARTICLE_COLUMNS} ORDER BY a.created_at DESC, a.id DESC LIMIT $1 OFFSET $2"
        );
        let articles = sqlx::query_as::<_, Article>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    async fn articles_by_author(&self, author_id: Uuid) -> RepositoryResult<Vec<Article>> {
        let query = format!(
            "{ARTICLE_COLUMNS} WHERE a.author_id = $1 ORDER BY a.created_at DESC, a.id DESC"
        );
        let articles = sqlx::query_as::<_, Article>(&query)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    async fn get_article(&self, id: i64) -> RepositoryResult<Option<Article>> {
        let query = format!("{ARTICLE_COLUMNS} WHERE a.id = $1");
        let article = sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    /// create_article
    ///
    /// Inserts and joins with `users` in one statement (CTE) to return the
    /// enriched `Article`.
    async fn create_article(&self, author_id: Uuid, article: NewArticle) -> RepositoryResult<Article> {
        let created = sqlx::query_as::<_, Article>(
            r#"
            WITH inserted AS (
                INSERT INTO articles (title, body, author_id) VALUES ($1, $2, $3)
                RETURNING id, title, body, author_id, created_at
            )
            SELECT i.id, i.title, i.body, i.author_id, u.username AS author_username, i.created_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(article.title)
        .bind(article.body)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// update_article
    ///
    /// `None` when no row matched (the article was deleted meanwhile).
    async fn update_article(&self, id: i64, changes: NewArticle) -> RepositoryResult<Option<Article>> {
        let updated = sqlx::query_as::<_, Article>(
            r#"
            WITH updated AS (
                UPDATE articles SET title = $2, body = $3 WHERE id = $1
                RETURNING id, title, body, author_id, created_at
            )
            SELECT d.id, d.title, d.body, d.author_id, u.username AS author_username, d.created_at
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.body)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    /// delete_article
    ///
    /// Comments go with the article through `ON DELETE CASCADE`.
    async fn delete_article(&self, id: i64) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// create_comment
    ///
    /// A vanished article surfaces as `RepositoryError::MissingReference`.
    async fn create_comment(
        &self,
        article_id: i64,
        author_id: Uuid,
        comment: NewComment,
    ) -> RepositoryResult<Comment> {
        let created = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (article_id, author_id, body) VALUES ($1, $2, $3)
                RETURNING id, article_id, author_id, body, created_at
            )
            SELECT i.id, i.article_id, i.author_id, u.username AS author_username, i.body, i.created_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(article_id)
        .bind(author_id)
        .bind(comment.body)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn comments_for_article(&self, article_id: i64) -> RepositoryResult<Vec<Comment>> {
        let query =
            format!("{COMMENT_COLUMNS} WHERE c.article_id = $1 ORDER BY c.created_at ASC, c.id ASC");
        let comments = sqlx::query_as::<_, Comment>(&query)
            .bind(article_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(comments)
    }

    /// create_session
    ///
    /// A deleted user takes their sessions along (`ON DELETE CASCADE`).
    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> RepositoryResult<Uuid> {
        let session_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(session_id)
    }

    /// session_user
    ///
    /// Expired rows are treated as absent; they are never resurrected.
    async fn session_user(&self, session_id: Uuid) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1 AND s.expires_at > NOW()
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_session(&self, session_id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- In-memory implementation ---

#[derive(Debug, Clone)]
struct ArticleRow {
    id: i64,
    title: String,
    body: String,
    author_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: i64,
    article_id: i64,
    author_id: Uuid,
    body: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    users: Vec<UserCredentials>,
    articles: Vec<ArticleRow>,
    comments: Vec<CommentRow>,
    sessions: Vec<SessionRow>,
    last_article_id: i64,
    last_comment_id: i64,
}

impl Store {
    fn username(&self, id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn article(&self, row: &ArticleRow) -> Article {
        Article {
            id: row.id,
            title: row.title.clone(),
            body: row.body.clone(),
            author_id: row.author_id,
            author_username: self.username(row.author_id),
            created_at: row.created_at,
        }
    }

    fn comment(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            article_id: row.article_id,
            author_id: row.author_id,
            author_username: self.username(row.author_id),
            body: row.body.clone(),
            created_at: row.created_at,
        }
    }

    /// Newest first, ties broken by id like the SQL ordering.
    fn sorted_articles<'a>(&'a self, rows: impl Iterator<Item = &'a ArticleRow>) -> Vec<Article> {
        let mut rows: Vec<&ArticleRow> = rows.collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.into_iter().map(|row| self.article(row)).collect()
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory, enforcing the same
/// constraints as the SQL schema (unique usernames, existing references,
/// cascading deletes). Used by the test suite.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, username: &str, password_hash: &str) -> RepositoryResult<User> {
        let mut store = self.store.write().await;
        if store.users.iter().any(|u| u.username == username) {
            return Err(RepositoryError::Conflict("uq_users_username".to_string()));
        }
        let credentials = UserCredentials {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        store.users.push(credentials.clone());
        Ok(credentials.into())
    }

    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self.find_credentials(username).await?.map(User::from))
    }

    async fn find_credentials(&self, username: &str) -> RepositoryResult<Option<UserCredentials>> {
        let store = self.store.read().await;
        Ok(store.users.iter().find(|u| u.username == username).cloned())
    }

    async fn count_articles(&self) -> RepositoryResult<i64> {
        Ok(self.store.read().await.articles.len() as i64)
    }

    async fn list_articles(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store
            .sorted_articles(store.articles.iter())
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn articles_by_author(&self, author_id: Uuid) -> RepositoryResult<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store.sorted_articles(store.articles.iter().filter(|a| a.author_id == author_id)))
    }

    async fn get_article(&self, id: i64) -> RepositoryResult<Option<Article>> {
        let store = self.store.read().await;
        Ok(store
            .articles
            .iter()
            .find(|a| a.id == id)
            .map(|row| store.article(row)))
    }

    async fn create_article(&self, author_id: Uuid, article: NewArticle) -> RepositoryResult<Article> {
        let mut store = self.store.write().await;
        if !store.users.iter().any(|u| u.id == author_id) {
            return Err(RepositoryError::MissingReference(
                "articles_author_id_fkey".to_string(),
            ));
        }
        store.last_article_id += 1;
        let row = ArticleRow {
            id: store.last_article_id,
            title: article.title,
            body: article.body,
            author_id,
            created_at: Utc::now(),
        };
        store.articles.push(row.clone());
        Ok(store.article(&row))
    }

    async fn update_article(&self, id: i64, changes: NewArticle) -> RepositoryResult<Option<Article>> {
        let mut store = self.store.write().await;
        let Some(row) = store.articles.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        row.title = changes.title;
        row.body = changes.body;
        let row = row.clone();
        Ok(Some(store.article(&row)))
    }

    async fn delete_article(&self, id: i64) -> RepositoryResult<bool> {
        let mut store = self.store.write().await;
        let before = store.articles.len();
        store.articles.retain(|a| a.id != id);
        if store.articles.len() == before {
            return Ok(false);
        }
        store.comments.retain(|c| c.article_id != id);
        Ok(true)
    }

    async fn create_comment(
        &self,
        article_id: i64,
        author_id: Uuid,
        comment: NewComment,
    ) -> RepositoryResult<Comment> {
        let mut store = self.store.write().await;
        if !store.articles.iter().any(|a| a.id == article_id) {
            return Err(RepositoryError::MissingReference(
                "comments_article_id_fkey".to_string(),
            ));
        }
        if !store.users.iter().any(|u| u.id == author_id) {
            return Err(RepositoryError::MissingReference(
                "comments_author_id_fkey".to_string(),
            ));
        }
        store.last_comment_id += 1;
        let row = CommentRow {
            id: store.last_comment_id,
            article_id,
            author_id,
            body: comment.body,
            created_at: Utc::now(),
        };
        store.comments.push(row.clone());
        Ok(store.comment(&row))
    }

    async fn comments_for_article(&self, article_id: i64) -> RepositoryResult<Vec<Comment>> {
        let store = self.store.read().await;
        let mut rows: Vec<&CommentRow> = store
            .comments
            .iter()
            .filter(|c| c.article_id == article_id)
            .collect();
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(rows.into_iter().map(|row| store.comment(row)).collect())
    }

    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> RepositoryResult<Uuid> {
        let mut store = self.store.write().await;
        if !store.users.iter().any(|u| u.id == user_id) {
            return Err(RepositoryError::MissingReference(
                "sessions_user_id_fkey".to_string(),
            ));
        }
        let id = Uuid::new_v4();
        store.sessions.push(SessionRow {
            id,
            user_id,
            expires_at,
        });
        Ok(id)
    }

    async fn session_user(&self, session_id: Uuid) -> RepositoryResult<Option<User>> {
        let store = self.store.read().await;
        let now = Utc::now();
        Ok(store
            .sessions
            .iter()
            .find(|s| s.id == session_id && s.expires_at > now)
            .and_then(|s| store.users.iter().find(|u| u.id == s.user_id))
            .cloned()
            .map(User::from))
    }

    async fn delete_session(&self, session_id: Uuid) -> RepositoryResult<bool> {
        let mut store = self.store.write().await;
        let before = store.sessions.len();
        store.sessions.retain(|s| s.id != session_id);
        Ok(store.sessions.len() != before)
    }
}
