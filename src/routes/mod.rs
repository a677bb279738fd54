/// Router Module Index
///
/// Organizes the routing logic into access-segregated modules. Access control is
/// applied at the module level (via Axum layers), so a protected endpoint cannot
/// be exposed by forgetting an extractor.

/// Routes accessible to everyone (anonymous or logged-in).
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
/// Anonymous requests are redirected to the login page.
pub mod authenticated;

// --- Path patterns (axum syntax) ---

pub const HOME: &str = "/";
pub const REGISTER: &str = "/inscription/";
pub const LOGIN: &str = "/connexion/";
pub const LOGOUT: &str = "/deconnexion/";
pub const CREATE_ARTICLE: &str = "/article/creer/";
pub const ARTICLE_DETAIL: &str = "/article/{id}/";
pub const EDIT_ARTICLE: &str = "/article/{id}/modifier/";
pub const DELETE_ARTICLE: &str = "/article/{id}/supprimer/";
pub const ADD_COMMENT: &str = "/article/{id}/ajouter_commentaire/";
pub const PROFILE: &str = "/profil/{username}/";

/// Route
///
/// Redirect targets. Every redirect goes through this enum so that a path change
/// only ever happens in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    ArticleDetail(i64),
}

impl Route {
    /// The concrete path for this route.
    pub fn path(&self) -> String {
        match self {
            Route::Home => HOME.to_string(),
            Route::Login => LOGIN.to_string(),
            Route::ArticleDetail(id) => ARTICLE_DETAIL.replace("{id}", &id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Route;

    #[test]
    fn redirect_targets_expand_their_parameters() {
        assert_eq!(Route::Home.path(), "/");
        assert_eq!(Route::Login.path(), "/connexion/");
        assert_eq!(Route::ArticleDetail(7).path(), "/article/7/");
    }
}
