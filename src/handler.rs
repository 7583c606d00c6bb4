//! HTTP request handlers for the go-link redirector
//!
//! This module maps requests onto registry operations:
//! - Resolving keywords into redirects, list pages or disambiguation lists
//! - Creating, editing and deleting links
//! - Managing list policies, names and template variables

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::clicks;
use crate::error::GoError;
use crate::model::{
    CreateLinkRequest, Link, LinkId, LinkUpdate, Policy, PolicyRequest, RenameRequest, TopParams,
    VariableRequest,
};
use crate::ranking::{click_info, opacity};
use crate::registry::ListView;
use crate::resolver::Resolution;
use crate::route::AppState;

/// A link plus the derived usage figures shown in listings
#[derive(Serialize)]
pub struct LinkSummary {
    #[serde(flatten)]
    pub link: Link,
    pub recent_clicks: u64,
    pub total_clicks: u64,
    pub opacity: f64,
    pub usage: String,
}

impl LinkSummary {
    fn new(link: Link, today: i32) -> Self {
        Self {
            recent_clicks: link.clicks.recent_clicks(),
            total_clicks: link.clicks.total_clicks(),
            opacity: opacity(&link.clicks, today),
            usage: click_info(&link.clicks, today),
            link,
        }
    }
}

fn summaries(links: Vec<Link>) -> Vec<LinkSummary> {
    let today = clicks::today();
    links
        .into_iter()
        .map(|link| LinkSummary::new(link, today))
        .collect()
}

fn list_page(view: ListView) -> Response {
    let today = clicks::today();
    Json(json!({
        "list": view.list,
        "usage": click_info(&view.list.clicks, today),
        "links": summaries(view.links),
    }))
    .into_response()
}

fn resolution_response(resolution: Resolution) -> Response {
    match resolution {
        Resolution::Redirect { url, .. } => Redirect::temporary(&url).into_response(),
        Resolution::List(view) => list_page(view),
        Resolution::Ambiguous {
            keyword,
            candidates,
        } => (
            StatusCode::MULTIPLE_CHOICES,
            Json(json!({
                "keyword": keyword,
                "candidates": candidates,
            })),
        )
            .into_response(),
        Resolution::NotFound { reason } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": reason,
                "code": "not_found"
            })),
        )
            .into_response(),
    }
}

/// Resolves `/{keyword}[/rest]` and `/.{keyword}`
///
/// # Response
///
/// - **307 Temporary Redirect** - the keyword resolved to one destination
/// - **200 OK** - list page (policy `list`, or a `.`-prefixed request)
/// - **300 Multiple Choices** - several regex lists matched
/// - **404 Not Found** - invalid or unknown keyword
///
/// 307 keeps browsers from caching the destination, so every visit is
/// counted and edits take effect immediately.
pub async fn resolve_keyword(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GoError> {
    let path = uri.path();

    if path.trim_end_matches('/') == "/.me" {
        let username = state.identity.current_username(&headers);
        return Ok(Redirect::temporary(&format!("/.{}", username)).into_response());
    }

    let resolution = state.db.resolve(path)?;
    Ok(resolution_response(resolution))
}

/// `GET /_link_/{id}` - permanent redirect straight to a link
pub async fn follow_link(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, GoError> {
    let url = state.db.follow_link(LinkId(id))?;
    Ok(Redirect::permanent(&url).into_response())
}

/// `GET /lucky` - redirect to a random keyword's link
pub async fn lucky(State(state): State<AppState>) -> Result<Response, GoError> {
    Ok(resolution_response(state.db.lucky()?))
}

/// `GET /me` - redirect to the keyword named after the current user
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let username = state.identity.current_username(&headers);
    Redirect::temporary(&format!("/{}", username)).into_response()
}

/// Creates a new link
///
/// # Request Body
///
/// ```json
/// {
///   "lists": ["wiki"],
///   "url": "https://wiki.example.com",
///   "title": "Team wiki"
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - link created, lists created as needed
/// - **409 Conflict** - another link has this URL; body carries that link
/// - **404 Not Found** - a keyword failed sanitization
pub async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<Response, GoError> {
    let editor = state.identity.current_username(&headers);
    let link = state
        .db
        .create_link(&payload.lists, &payload.url, &payload.title, &editor)?;

    Ok((StatusCode::CREATED, Json(link)).into_response())
}

pub async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, GoError> {
    let link = state.db.get_link(LinkId(id))?;
    let main_keyword = state.db.main_keyword(link.id)?.map(|list| list.name);
    let today = clicks::today();

    Ok(Json(json!({
        "link": LinkSummary::new(link, today),
        "main_keyword": main_keyword,
    }))
    .into_response())
}

pub async fn update_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(update): Json<LinkUpdate>,
) -> Result<Response, GoError> {
    let editor = state.identity.current_username(&headers);
    let link = state.db.update_link(LinkId(id), update, &editor)?;
    Ok(Json(link).into_response())
}

pub async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, GoError> {
    state.db.delete_link(LinkId(id))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Link deleted successfully",
            "deleted_id": id
        })),
    )
        .into_response())
}

/// `GET /api/links?n=20` - most popular links first
pub async fn top_links(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> Result<Response, GoError> {
    let n = params.n.unwrap_or(100).min(1000);
    let links = state.db.top_links(n)?;
    Ok(Json(summaries(links)).into_response())
}

/// `GET /api/special` - regex and generative links
pub async fn special_links(State(state): State<AppState>) -> Result<Response, GoError> {
    Ok(Json(summaries(state.db.special_links()?)).into_response())
}

pub async fn all_lists(State(state): State<AppState>) -> Result<Response, GoError> {
    let today = clicks::today();
    let lists: Vec<_> = state
        .db
        .all_lists()?
        .into_iter()
        .map(|list| {
            json!({
                "name": list.name,
                "usage": list.usage(),
                "policy": list.policy,
                "links": list.links.len(),
                "opacity": opacity(&list.clicks, today),
                "clicks": click_info(&list.clicks, today),
            })
        })
        .collect();

    Ok(Json(lists).into_response())
}

pub async fn get_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, GoError> {
    Ok(list_page(state.db.list_links(&name)?))
}

pub async fn delete_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, GoError> {
    state.db.delete_list(&name)?;
    Ok(Json(json!({
        "message": format!("deleted go/{}", name),
    }))
    .into_response())
}

pub async fn set_list_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<PolicyRequest>,
) -> Result<Response, GoError> {
    let policy: Policy = payload.policy.parse()?;
    state.db.set_list_policy(&name, policy)?;
    Ok(Json(json!({ "name": name, "policy": policy })).into_response())
}

pub async fn rename_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<RenameRequest>,
) -> Result<Response, GoError> {
    let list = state.db.rename_list(&name, &payload.name)?;
    Ok(Json(json!({
        "message": format!("renamed go/{} to go/{}", name, list.name),
        "list": list,
    }))
    .into_response())
}

pub async fn get_variables(State(state): State<AppState>) -> Result<Response, GoError> {
    Ok(Json(state.db.variables()?).into_response())
}

pub async fn set_variable(
    State(state): State<AppState>,
    Json(payload): Json<VariableRequest>,
) -> Result<Response, GoError> {
    state.db.set_variable(&payload.name, &payload.value)?;
    Ok(Json(json!({
        "name": payload.name,
        "value": payload.value,
        "updated_at": Utc::now(),
    }))
    .into_response())
}
