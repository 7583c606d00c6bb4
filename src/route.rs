//! Route definitions for the go-link redirector
//!
//! This module configures all HTTP routes and maps them to their respective handlers.
//! It creates the Axum router with the application state.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;

use crate::handler::{
    all_lists, create_link, delete_link, delete_list, follow_link, get_link, get_list,
    get_variables, lucky, me, rename_list, resolve_keyword, set_list_policy, set_variable,
    special_links, top_links, update_link,
};
use crate::middleware::{auth_middleware, HeaderIdentity, IdentityProvider};
use crate::registry::LinkDatabase;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<LinkDatabase>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// State with the default header-based identity provider
    pub fn new(db: LinkDatabase) -> Self {
        Self {
            db: Arc::new(db),
            identity: Arc::new(HeaderIdentity::default()),
        }
    }

    pub fn with_identity(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }
}

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /{keyword}[/rest]` - Resolves a keyword (public endpoint)
/// - `GET /_link_/{id}` - Redirects straight to a link
/// - `GET /lucky`, `GET /me` - Random link, personal keyword
/// - `GET|POST /api/links` - Top links, create a link
/// - `GET|PUT|DELETE /api/links/{id}` - Inspect, edit, delete a link
/// - `GET /api/lists`, `GET|DELETE /api/lists/{name}` - Lists
/// - `PUT /api/lists/{name}/policy`, `POST /api/lists/{name}/rename`
/// - `GET /api/special` - Regex and generative links
/// - `GET|PUT /api/variables` - URL template variables
///
/// # Example Usage
///
/// ```no_run
/// # use golinks::registry::LinkDatabase;
/// # use golinks::route::{create_app, AppState};
/// let state = AppState::new(LinkDatabase::in_memory());
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    // API routes that require authorization check
    let api_routes = Router::new()
        .route("/links", get(top_links).post(create_link))
        .route(
            "/links/{id}",
            get(get_link).put(update_link).delete(delete_link),
        )
        .route("/lists", get(all_lists))
        .route("/lists/{name}", get(get_list).delete(delete_list))
        .route("/lists/{name}/policy", put(set_list_policy))
        .route("/lists/{name}/rename", post(rename_list))
        .route("/special", get(special_links))
        .route("/variables", get(get_variables).put(set_variable))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/_link_/{id}", get(follow_link))
        .route("/lucky", get(lucky))
        .route("/me", get(me))
        // Public keyword endpoint, everything not matched above
        .route("/{*path}", get(resolve_keyword))
        .nest("/api", api_routes)
        .with_state(state)
}
