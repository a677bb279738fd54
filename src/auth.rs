use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
    response::Redirect,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppResult,
    models::User,
    repository::RepositoryState,
    routes::Route,
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Development-only header naming a user id (honoured in `Env::Local` only).
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of the HS256 session token stored in the session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID.
    pub sub: Uuid,
    /// Session id (sid): the server-side row that must still exist for the
    /// token to be honoured. Logout deletes it.
    pub sid: Uuid,
    /// Expiration Time (exp): the session ends here even if the cookie survives.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers take it as an
/// explicit argument, so "who is acting" is always visible in the signature.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        AuthUser {
            id: user.id,
            username: user.username,
        }
    }
}

/// Signs a session token for `user_id` and session `session_id`, valid for
/// `config.session_ttl_secs`.
pub fn issue_session_token(
    user_id: Uuid,
    session_id: Uuid,
    config: &AppConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        sub: user_id,
        sid: session_id,
        iat: now,
        exp: now + config.session_ttl_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )
}

/// Validates signature and expiry, returning the embedded [`Claims`].
pub fn verify_session_token(
    token: &str,
    config: &AppConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.session_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// The cookie that establishes a session.
pub fn session_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.env == Env::Production)
        .build()
}

/// start_session
///
/// Logs `user` in:
/// 1. Records a session row expiring with the token.
/// 2. Signs a token naming both the user and that row.
/// 3. Returns `jar` with the fresh session cookie.
pub async fn start_session(
    jar: CookieJar,
    user: &User,
    repo: &RepositoryState,
    config: &AppConfig,
) -> AppResult<CookieJar> {
    let expires_at =
        chrono::Utc::now() + chrono::Duration::seconds(config.session_ttl_secs as i64);
    let session_id = repo.create_session(user.id, expires_at).await?;
    let token = issue_session_token(user.id, session_id, config)?;
    tracing::info!(user_id = %user.id, username = %user.username, %session_id, "Session started");
    Ok(jar.add(session_cookie(token, config)))
}

/// end_session
///
/// Logs out: revokes the session named by the cookie (if it still verifies) and
/// returns `jar` with the cookie removed. A replayed copy of the old cookie no
/// longer resolves to anyone.
pub async fn end_session(
    jar: CookieJar,
    repo: &RepositoryState,
    config: &AppConfig,
) -> AppResult<CookieJar> {
    let claims = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| verify_session_token(cookie.value(), config).ok());
    if let Some(claims) = claims {
        if repo.delete_session(claims.sid).await? {
            tracing::info!(user_id = %claims.sub, session_id = %claims.sid, "Session ended");
        }
    }
    Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")))
}

/// resolve_session
///
/// Resolves the current actor, if any:
/// 1. Local bypass: `x-user-id` naming an existing user (`Env::Local` only).
/// 2. Session cookie: token signature and expiry are checked.
/// 3. DB lookup: the session row must still exist (not logged out) and belong
///    to the token's subject.
async fn resolve_session<S>(parts: &Parts, state: &S) -> Option<AuthUser>
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    let repo = RepositoryState::from_ref(state);
    let config = AppConfig::from_ref(state);

    if config.env == Env::Local {
        let bypass_id = parts
            .headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok());
        if let Some(user_id) = bypass_id {
            if let Some(user) = load_user(&repo, user_id).await {
                return Some(user);
            }
        }
    }

    let token = CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())?;

    let claims = match verify_session_token(&token, &config) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected session token");
            return None;
        }
    };

    match repo.session_user(claims.sid).await {
        Ok(Some(user)) if user.id == claims.sub => Some(AuthUser::from(user)),
        Ok(_) => {
            tracing::debug!(session_id = %claims.sid, "Session revoked or expired");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, session_id = %claims.sid, "Failed to load session");
            None
        }
    }
}

async fn load_user(repo: &RepositoryState, user_id: Uuid) -> Option<AuthUser> {
    match repo.get_user(user_id).await {
        Ok(user) => user.map(AuthUser::from),
        Err(e) => {
            tracing::error!(error = %e, %user_id, "Failed to load session user");
            None
        }
    }
}

/// Required identity. Anonymous requests are redirected to the login page; the
/// originally requested page is not remembered.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match resolve_session(parts, state).await {
            Some(user) => Ok(user),
            None => Err(Redirect::to(&Route::Login.path())),
        }
    }
}

/// Optional identity, for pages open to everyone (`Option<AuthUser>`).
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(resolve_session(parts, state).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_round_trips() {
        let config = AppConfig::default();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = issue_session_token(user_id, session_id, &config).unwrap();
        let claims = verify_session_token(&token, &config).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.exp - claims.iat, config.session_ttl_secs as usize);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let config = AppConfig::default();
        let other = AppConfig {
            session_secret: "some-other-secret".to_string(),
            ..AppConfig::default()
        };
        let token = issue_session_token(Uuid::new_v4(), Uuid::new_v4(), &other).unwrap();
        assert!(verify_session_token(&token, &config).is_err());
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("abc".to_string(), &AppConfig::default());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
