//! Form payloads and their validation.
//!
//! Every form is a raw, fully-defaulted payload (`*Input`) that axum's `Form`
//! extractor can always decode, plus a `validate_*` function that turns it into
//! a validated value or a set of per-field messages. Nothing here touches the
//! repository; uniqueness checks happen in the handlers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::Article;

pub const TITLE_MAX_LENGTH: usize = 200;
pub const USERNAME_MAX_LENGTH: usize = 150;
pub const PASSWORD_MIN_LENGTH: usize = 8;
/// Password/username similarity ratio at or above which a password is refused.
pub const PASSWORD_MAX_SIMILARITY: f64 = 0.7;

/// Key used for errors that belong to the form as a whole.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// FieldErrors
///
/// Messages keyed by field name, in submission order per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldErrors(pub BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns `Ok(value)` when no message was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

fn required<'a>(errors: &mut FieldErrors, field: &str, raw: &'a str) -> &'a str {
    let value = raw.trim();
    if value.is_empty() {
        errors.add(field, REQUIRED_MESSAGE);
    }
    value
}

// --- Article ---

/// ArticleInput
///
/// Raw create/edit submission. Also used to pre-fill the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(default)]
pub struct ArticleInput {
    pub title: String,
    pub body: String,
}

impl From<&Article> for ArticleInput {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            body: article.body.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub title: String,
    pub body: String,
}

pub fn validate_article(input: &ArticleInput) -> Result<NewArticle, FieldErrors> {
    let mut errors = FieldErrors::new();

    let title = required(&mut errors, "title", &input.title);
    let title_len = title.chars().count();
    if title_len > TITLE_MAX_LENGTH {
        errors.add(
            "title",
            format!(
                "Ensure this value has at most {TITLE_MAX_LENGTH} characters (it has {title_len})."
            ),
        );
    }
    let body = required(&mut errors, "body", &input.body);

    errors.into_result(NewArticle {
        title: title.to_string(),
        body: body.to_string(),
    })
}

// --- Comment ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(default)]
pub struct CommentInput {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub body: String,
}

pub fn validate_comment(input: &CommentInput) -> Result<NewComment, FieldErrors> {
    let mut errors = FieldErrors::new();
    let body = required(&mut errors, "body", &input.body);
    errors.into_result(NewComment {
        body: body.to_string(),
    })
}

// --- Registration ---

/// RegisterInput
///
/// Candidate credentials. Passwords are never echoed back into a view.
#[derive(Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct RegisterInput {
    pub username: String,
    pub password1: String,
    pub password2: String,
}

impl std::fmt::Debug for RegisterInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterInput")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')
}

/// Characters shared by `a` and `b`: the longest common run, then recursively
/// the same on both sides of it (Ratcliff/Obershelp).
fn matching_chars(a: &[char], b: &[char]) -> usize {
    // Longest common substring by dynamic programming over suffix lengths.
    let mut best = (0, 0, 0);
    let mut previous = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut current = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                current[j + 1] = previous[j] + 1;
                if current[j + 1] > best.2 {
                    best = (i + 1 - current[j + 1], j + 1 - current[j + 1], current[j + 1]);
                }
            }
        }
        previous = current;
    }

    let (i, j, len) = best;
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Similarity in `[0, 1]`: twice the matching characters over the total length.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Compared case-insensitively against the whole username and each of its
/// `@ . + - _` separated parts.
fn is_too_similar(password: &str, username: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    let password = password.to_lowercase();
    let username = username.to_lowercase();
    username
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .chain(std::iter::once(username.as_str()))
        .any(|part| similarity(&password, part) >= PASSWORD_MAX_SIMILARITY)
}

pub fn validate_registration(input: &RegisterInput) -> Result<NewAccount, FieldErrors> {
    let mut errors = FieldErrors::new();

    let username = required(&mut errors, "username", &input.username);
    if username.chars().count() > USERNAME_MAX_LENGTH {
        errors.add(
            "username",
            format!("Ensure this value has at most {USERNAME_MAX_LENGTH} characters."),
        );
    }
    if !username.chars().all(is_username_char) {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    // Passwords are compared verbatim, only emptiness is judged after trimming.
    if input.password1.trim().is_empty() {
        errors.add("password1", REQUIRED_MESSAGE);
    }
    if input.password2.trim().is_empty() {
        errors.add("password2", REQUIRED_MESSAGE);
    }

    if !errors.contains("password1") && !errors.contains("password2") {
        let password = input.password1.as_str();
        if password != input.password2 {
            errors.add("password2", "The two password fields didn't match.");
        } else {
            if password.chars().count() < PASSWORD_MIN_LENGTH {
                errors.add(
                    "password2",
                    format!(
                        "This password is too short. It must contain at least {PASSWORD_MIN_LENGTH} characters."
                    ),
                );
            }
            if password.chars().all(|c| c.is_ascii_digit()) {
                errors.add("password2", "This password is entirely numeric.");
            }
            if is_too_similar(password, username) {
                errors.add("password2", "The password is too similar to the username.");
            }
        }
    }

    errors.into_result(NewAccount {
        username: username.to_string(),
        password: input.password1.clone(),
    })
}

// --- Login ---

#[derive(Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInput")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub fn validate_login(input: &LoginInput) -> Result<Credentials, FieldErrors> {
    let mut errors = FieldErrors::new();
    let username = required(&mut errors, "username", &input.username);
    if input.password.is_empty() {
        errors.add("password", REQUIRED_MESSAGE);
    }
    errors.into_result(Credentials {
        username: username.to_string(),
        password: input.password.clone(),
    })
}

/// The single message shown for unknown users and wrong passwords alike.
pub const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, password1: &str, password2: &str) -> RegisterInput {
        RegisterInput {
            username: username.to_string(),
            password1: password1.to_string(),
            password2: password2.to_string(),
        }
    }

    #[test]
    fn article_fields_are_trimmed() {
        let input = ArticleInput {
            title: "  Hello  ".to_string(),
            body: "\nWorld\n".to_string(),
        };
        let article = validate_article(&input).expect("valid article");
        assert_eq!(article.title, "Hello");
        assert_eq!(article.body, "World");
    }

    #[test]
    fn blank_article_reports_both_fields() {
        let errors = validate_article(&ArticleInput {
            title: "   ".to_string(),
            body: String::new(),
        })
        .unwrap_err();
        assert_eq!(errors.get("title"), [REQUIRED_MESSAGE.to_string()]);
        assert_eq!(errors.get("body"), [REQUIRED_MESSAGE.to_string()]);
    }

    #[test]
    fn overlong_title_is_rejected() {
        let errors = validate_article(&ArticleInput {
            title: "x".repeat(TITLE_MAX_LENGTH + 1),
            body: "body".to_string(),
        })
        .unwrap_err();
        assert!(errors.get("title")[0].contains("at most 200"));
        assert!(!errors.contains("body"));
    }

    #[test]
    fn empty_comment_is_rejected() {
        assert!(validate_comment(&CommentInput::default()).is_err());
        assert_eq!(
            validate_comment(&CommentInput {
                body: " nice ".to_string()
            })
            .unwrap()
            .body,
            "nice"
        );
    }

    #[test]
    fn registration_accepts_reasonable_account() {
        let account = validate_registration(&registration(
            "alice.b+blog",
            "correct-horse",
            "correct-horse",
        ))
        .expect("valid registration");
        assert_eq!(account.username, "alice.b+blog");
        assert_eq!(account.password, "correct-horse");
    }

    #[test]
    fn registration_rejects_mismatch_and_bad_handle() {
        let errors =
            validate_registration(&registration("bad name!", "correct-horse", "other-horse"))
                .unwrap_err();
        assert!(errors.contains("username"));
        assert_eq!(
            errors.get("password2"),
            ["The two password fields didn't match.".to_string()]
        );
    }

    #[test]
    fn registration_enforces_password_rules() {
        let errors = validate_registration(&registration("bob", "1234", "1234")).unwrap_err();
        let messages = errors.get("password2");
        assert!(messages.iter().any(|m| m.contains("too short")));
        assert!(messages.iter().any(|m| m.contains("entirely numeric")));

        let errors =
            validate_registration(&registration("bobbybobby", "BobbyBobby", "BobbyBobby"))
                .unwrap_err();
        assert!(errors.get("password2")[0].contains("too similar"));
    }

    #[test]
    fn near_copies_of_the_username_are_too_similar() {
        for (username, password) in [
            ("alice_smith", "alicesmith1"),
            ("jean.dupont", "Dupont2024"),
            ("marguerite", "marguerite!"),
        ] {
            let errors = validate_registration(&registration(username, password, password))
                .unwrap_err();
            assert!(
                errors.get("password2").iter().any(|m| m.contains("too similar")),
                "{username} / {password}"
            );
        }

        assert!(!is_too_similar("correct-horse", "alice"));
        assert!(!is_too_similar("correct-horse", "mallory"));
    }

    #[test]
    fn similarity_matches_shared_runs() {
        assert_eq!(similarity("abcd", "abcd"), 1.0);
        assert_eq!(similarity("abcd", "wxyz"), 0.0);
        // "ab" and "d" match: 2 * 3 / 8.
        assert!((similarity("abcd", "abxd") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn login_requires_both_fields() {
        let errors = validate_login(&LoginInput::default()).unwrap_err();
        assert!(errors.contains("username"));
        assert!(errors.contains("password"));
    }

    #[test]
    fn debug_output_hides_passwords() {
        let rendered = format!("{:?}", registration("carol", "s3cret-pass", "s3cret-pass"));
        assert!(!rendered.contains("s3cret"));
    }
}
