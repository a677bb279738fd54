use blogapp::{
    forms::{NewArticle, NewComment},
    repository::{InMemoryRepository, PostgresRepository, Repository, RepositoryError},
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::test;
use uuid::Uuid;

// --- Test Context and Setup ---

/// Holds the database pool for the Postgres-backed tests.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

fn new_article(title: &str) -> NewArticle {
    NewArticle {
        title: title.to_string(),
        body: format!("{title} body"),
    }
}

fn new_comment(body: &str) -> NewComment {
    NewComment {
        body: body.to_string(),
    }
}

/// Usernames must be unique across runs against a shared database.
fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..8])
}

// --- Shared contract checks (run against every implementation) ---

async fn check_unique_usernames(repo: &dyn Repository) {
    let name = unique_name("dup");
    repo.create_user(&name, "hash").await.unwrap();

    let err = repo.create_user(&name, "other-hash").await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)), "got {err:?}");
}

async fn check_article_lifecycle(repo: &dyn Repository) {
    let author = repo.create_user(&unique_name("author"), "hash").await.unwrap();
    let reader = repo.create_user(&unique_name("reader"), "hash").await.unwrap();

    let article = repo.create_article(author.id, new_article("Original")).await.unwrap();
    assert_eq!(article.author_id, author.id);
    assert_eq!(article.author_username, author.username);

    let updated = repo
        .update_article(article.id, new_article("Revised"))
        .await
        .unwrap()
        .expect("article exists");
    assert_eq!(updated.title, "Revised");
    assert_eq!(updated.author_id, author.id);
    assert_eq!(updated.created_at, article.created_at);

    let first = repo
        .create_comment(article.id, reader.id, new_comment("First"))
        .await
        .unwrap();
    let second = repo
        .create_comment(article.id, reader.id, new_comment("Second"))
        .await
        .unwrap();
    let comments = repo.comments_for_article(article.id).await.unwrap();
    let ids: Vec<_> = comments.iter().map(|c| c.id).collect();
    assert_eq!(ids, [first.id, second.id]);
    assert_eq!(comments[0].author_username, reader.username);

    assert!(repo.delete_article(article.id).await.unwrap());
    assert!(repo.get_article(article.id).await.unwrap().is_none());
    assert!(repo.comments_for_article(article.id).await.unwrap().is_empty());
    assert!(!repo.delete_article(article.id).await.unwrap());
    assert!(
        repo.update_article(article.id, new_article("Ghost"))
            .await
            .unwrap()
            .is_none()
    );
}

async fn check_comment_needs_existing_article(repo: &dyn Repository) {
    let reader = repo.create_user(&unique_name("reader"), "hash").await.unwrap();
    let err = repo
        .create_comment(i64::MAX, reader.id, new_comment("Into the void"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::MissingReference(_)), "got {err:?}");
}

async fn check_author_listing(repo: &dyn Repository) {
    let author = repo.create_user(&unique_name("prolific"), "hash").await.unwrap();
    let other = repo.create_user(&unique_name("other"), "hash").await.unwrap();

    let older = repo.create_article(author.id, new_article("Older")).await.unwrap();
    repo.create_article(other.id, new_article("Not mine")).await.unwrap();
    let newer = repo.create_article(author.id, new_article("Newer")).await.unwrap();

    let ids: Vec<_> = repo
        .articles_by_author(author.id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, [newer.id, older.id]);
}

async fn check_session_lifecycle(repo: &dyn Repository) {
    let user = repo.create_user(&unique_name("visitor"), "hash").await.unwrap();
    let expires_at = Utc::now() + Duration::hours(1);

    let first = repo.create_session(user.id, expires_at).await.unwrap();
    let second = repo.create_session(user.id, expires_at).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(
        repo.session_user(first).await.unwrap().map(|u| u.id),
        Some(user.id)
    );

    assert!(repo.delete_session(first).await.unwrap());
    assert!(repo.session_user(first).await.unwrap().is_none());
    assert!(!repo.delete_session(first).await.unwrap());
    // Other logins of the same user are untouched.
    assert!(repo.session_user(second).await.unwrap().is_some());

    let stale = repo
        .create_session(user.id, Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(repo.session_user(stale).await.unwrap().is_none());

    let err = repo.create_session(Uuid::new_v4(), expires_at).await.unwrap_err();
    assert!(matches!(err, RepositoryError::MissingReference(_)), "got {err:?}");
}

// --- In-memory implementation ---

#[test]
async fn test_memory_unique_usernames() {
    check_unique_usernames(&InMemoryRepository::new()).await;
}

#[test]
async fn test_memory_article_lifecycle() {
    check_article_lifecycle(&InMemoryRepository::new()).await;
}

#[test]
async fn test_memory_comment_needs_existing_article() {
    check_comment_needs_existing_article(&InMemoryRepository::new()).await;
}

#[test]
async fn test_memory_author_listing() {
    check_author_listing(&InMemoryRepository::new()).await;
}

#[test]
async fn test_memory_session_lifecycle() {
    check_session_lifecycle(&InMemoryRepository::new()).await;
}

#[test]
async fn test_memory_listing_pages_and_credentials() {
    let repo = InMemoryRepository::new();
    let author = repo.create_user("pager", "$argon2id$fake").await.unwrap();
    for i in 1..=7 {
        repo.create_article(author.id, new_article(&format!("A{i}")))
            .await
            .unwrap();
    }

    assert_eq!(repo.count_articles().await.unwrap(), 7);
    let second_page: Vec<_> = repo
        .list_articles(5, 5)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.title)
        .collect();
    assert_eq!(second_page, ["A2", "A1"]);

    let credentials = repo.find_credentials("pager").await.unwrap().unwrap();
    assert_eq!(credentials.id, author.id);
    assert_eq!(credentials.password_hash, "$argon2id$fake");
    assert!(repo.find_credentials("nobody").await.unwrap().is_none());
    assert_eq!(repo.get_user(author.id).await.unwrap(), Some(author));
}

// --- PostgreSQL implementation (needs DATABASE_URL) ---

#[test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn test_postgres_unique_usernames() {
    let ctx = DbTestContext::setup().await;
    check_unique_usernames(&ctx.repository()).await;
}

#[test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn test_postgres_article_lifecycle() {
    let ctx = DbTestContext::setup().await;
    check_article_lifecycle(&ctx.repository()).await;
}

#[test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn test_postgres_comment_needs_existing_article() {
    let ctx = DbTestContext::setup().await;
    check_comment_needs_existing_article(&ctx.repository()).await;
}

#[test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn test_postgres_author_listing() {
    let ctx = DbTestContext::setup().await;
    check_author_listing(&ctx.repository()).await;
}

#[test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn test_postgres_session_lifecycle() {
    let ctx = DbTestContext::setup().await;
    check_session_lifecycle(&ctx.repository()).await;
}
