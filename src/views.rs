//! View models handed to the template layer.
//!
//! A handler either renders one of these views (serialized as JSON, tagged by
//! `view`) or redirects to a named [`Route`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    forms::{ArticleInput, CommentInput, FieldErrors},
    models::{Article, Comment, User},
    pagination::PageWindow,
    routes::Route,
};

/// Whether the article editor creates or edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EditorAction {
    Create,
    Edit,
}

/// ArticlePage
///
/// One page of the home listing plus the metadata the pager widget needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_page_number: Option<i64>,
    pub next_page_number: Option<i64>,
}

impl ArticlePage {
    pub fn new(articles: Vec<Article>, window: PageWindow) -> Self {
        Self {
            articles,
            number: window.number,
            num_pages: window.num_pages,
            count: window.count,
            has_previous: window.has_previous(),
            has_next: window.has_next(),
            previous_page_number: window.previous_page_number(),
            next_page_number: window.next_page_number(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct HomeView {
    pub page: ArticlePage,
}

/// Credentials forms only ever echo the username.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountForm {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountView {
    pub form: AccountForm,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleEditorView {
    pub action: EditorAction,
    pub form: ArticleInput,
    /// Present when editing.
    pub article: Option<Article>,
    pub errors: FieldErrors,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleDetailView {
    pub article: Article,
    pub comments: Vec<Comment>,
    pub comment_form: CommentInput,
    pub errors: FieldErrors,
    pub can_edit: bool,
    pub can_comment: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ConfirmDeleteView {
    pub article: Article,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileView {
    pub profile: User,
    pub articles: Vec<Article>,
}

/// View
///
/// Every page the application can render. The `view` tag names the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    Home(HomeView),
    Register(AccountView),
    Login(AccountView),
    ArticleEditor(ArticleEditorView),
    ArticleDetail(ArticleDetailView),
    ConfirmDelete(ConfirmDeleteView),
    Profile(ProfileView),
}

/// Reply
///
/// The outcome of a handler: render a view or redirect to a named route.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Render(View),
    Redirect(Route),
}

impl Reply {
    pub fn render(view: View) -> Self {
        Reply::Render(view)
    }

    pub fn redirect(route: Route) -> Self {
        Reply::Redirect(route)
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Render(view) => (StatusCode::OK, Json(view)).into_response(),
            // 303 See Other: a POST is always followed by a GET.
            Reply::Redirect(route) => Redirect::to(&route.path()).into_response(),
        }
    }
}
