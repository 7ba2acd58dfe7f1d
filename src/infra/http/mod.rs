mod auth;
mod middleware;
mod posts;
mod profiles;
mod public;
pub mod session;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    application::{
        auth::AuthService,
        error::ErrorReport,
        feed::FeedService,
        follows::FollowService,
        posts::PostService,
        repos::{HealthRepo, RepoError},
    },
    cache::{CacheState, response_cache_layer},
    infra::uploads::UploadStorage,
};

use middleware::{log_responses, resolve_viewer, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub health: Arc<dyn HealthRepo>,
    pub upload_storage: Arc<UploadStorage>,
    /// Home feed page cache; `None` when caching is disabled.
    pub cache: Option<CacheState>,
    pub secure_cookies: bool,
    pub max_request_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    // Only the home feed is cached.
    let cached_routes = Router::new().route("/", get(public::index));
    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(axum_middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let dynamic_routes = Router::new()
        .route("/group/{slug}/", get(public::group_posts))
        .route("/profile/{username}/", get(public::profile))
        .route("/profile/{username}/follow/", post(profiles::follow))
        .route("/profile/{username}/unfollow/", post(profiles::unfollow))
        .route("/follow/", get(public::follow_index))
        .route("/new/", get(posts::new_form).post(posts::create))
        .route("/{username}/{post_id}/", get(posts::detail))
        .route(
            "/{username}/{post_id}/edit/",
            get(posts::edit_form).post(posts::update),
        )
        .route("/{username}/{post_id}/comment/", post(posts::add_comment))
        .route("/auth/login/", get(auth::login_form).post(auth::login))
        .route("/auth/logout/", post(auth::logout))
        .route("/auth/signup/", get(auth::signup_form).post(auth::signup))
        .route("/about/author/", get(public::about_author))
        .route("/about/tech/", get(public::about_tech))
        .route("/404/", get(public::not_found_page))
        .route("/500/", get(public::server_error_page))
        .route("/uploads/{*path}", get(public::serve_upload))
        .route("/_health/db", get(public::db_health));

    cached_routes
        .merge(dynamic_routes)
        .fallback(public::fallback)
        .layer(DefaultBodyLimit::max(state.max_request_bytes))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_viewer,
        ))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Parse the numeric post id segment; anything else addresses no post.
fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
