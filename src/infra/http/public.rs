use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    },
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use mime_guess::mime;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::error::{ErrorReport, HttpError},
    infra::uploads::UploadStorageError,
    presentation::views::{
        AboutAuthorTemplate, AboutTechTemplate, ErrorPageView, FeedView, FollowTemplate,
        GroupTemplate, GroupView, IndexTemplate, LayoutContext, ProfileTemplate, ProfileView,
        render_error_page, render_template_response,
    },
};

use super::{
    HttpState, db_health_response,
    session::{CurrentViewer, RequireUser},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    page: Option<String>,
}

pub(super) async fn index(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let page = state.feed.index(query.page.as_deref()).await?;
    let view = LayoutContext::new(
        &viewer,
        "Latest posts",
        FeedView::new("Latest posts", &page, &viewer),
    );
    Ok(render_template_response(
        IndexTemplate { view },
        StatusCode::OK,
    ))
}

pub(super) async fn group_posts(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = state.feed.group(&slug, query.page.as_deref()).await?;
    let view = LayoutContext::new(
        &viewer,
        feed.group.title.clone(),
        GroupView::new(&feed.group, &feed.page, &viewer),
    );
    Ok(render_template_response(
        GroupTemplate { view },
        StatusCode::OK,
    ))
}

pub(super) async fn profile(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = state
        .feed
        .profile(&username, viewer.user(), query.page.as_deref())
        .await?;
    let view = LayoutContext::new(
        &viewer,
        format!("Profile of {}", feed.author.full_name),
        ProfileView::new(&feed.author, feed.stats, feed.following, &feed.page, &viewer),
    );
    Ok(render_template_response(
        ProfileTemplate { view },
        StatusCode::OK,
    ))
}

pub(super) async fn follow_index(
    State(state): State<HttpState>,
    user: RequireUser,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let viewer = user.viewer();
    let page = state.feed.following(&user.0, query.page.as_deref()).await?;
    let view = LayoutContext::new(
        &viewer,
        "Following",
        FeedView::new("Posts from authors you follow", &page, &viewer),
    );
    Ok(render_template_response(
        FollowTemplate { view },
        StatusCode::OK,
    ))
}

pub(super) async fn about_author(CurrentViewer(viewer): CurrentViewer) -> Response {
    let view = LayoutContext::new(&viewer, "About the author", ());
    render_template_response(AboutAuthorTemplate { view }, StatusCode::OK)
}

pub(super) async fn about_tech(CurrentViewer(viewer): CurrentViewer) -> Response {
    let view = LayoutContext::new(&viewer, "Technologies", ());
    render_template_response(AboutTechTemplate { view }, StatusCode::OK)
}

pub(super) async fn not_found_page(uri: Uri) -> Response {
    not_found_response(&uri, "infra::http::public::not_found_page")
}

pub(super) async fn server_error_page() -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let mut response = render_error_page(ErrorPageView::for_status(status, "Server error"));
    ErrorReport::from_message(
        "infra::http::public::server_error_page",
        status,
        "explicit render of the server error page",
    )
    .attach(&mut response);
    response
}

pub(super) async fn fallback(uri: Uri) -> Response {
    // Django-style canonical URLs: retry once with a trailing slash.
    if !uri.path().ends_with('/') && !uri.path().contains('.') {
        let target = match uri.query() {
            Some(query) => format!("{}/?{query}", uri.path()),
            None => format!("{}/", uri.path()),
        };
        return Redirect::permanent(&target).into_response();
    }
    not_found_response(&uri, "infra::http::public::fallback")
}

fn not_found_response(uri: &Uri, source: &'static str) -> Response {
    let mut response = render_error_page(ErrorPageView::not_found_at(uri.path()));
    ErrorReport::from_message(source, StatusCode::NOT_FOUND, "Resource not found")
        .attach(&mut response);
    response
}

pub(super) async fn serve_upload(
    State(state): State<HttpState>,
    Path(path): Path<String>,
) -> Response {
    const SOURCE: &str = "infra::http::public::serve_upload";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                &err,
            )
            .into_response()
        }
    }
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    // Only image types are served inline; anything else is opaque bytes.
    let content_type = mime_guess::from_path(path)
        .first()
        .filter(|guess| guess.type_() == mime::IMAGE && guess.subtype() != mime::SVG)
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
    if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

pub(super) async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_type(response: &Response) -> &str {
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    #[test]
    fn images_are_served_inline_with_nosniff() {
        let response = build_upload_response("posts/abc-cat.png", Bytes::from_static(b"png"));
        assert_eq!(content_type(&response), "image/png");
        assert_eq!(
            response.headers().get(X_CONTENT_TYPE_OPTIONS),
            Some(&HeaderValue::from_static("nosniff"))
        );
    }

    #[test]
    fn markup_uploads_are_served_as_opaque_bytes() {
        for path in ["posts/abc-x.html", "posts/abc-logo.svg", "posts/abc-noext"] {
            let response = build_upload_response(path, Bytes::from_static(b"<script></script>"));
            assert_eq!(content_type(&response), "application/octet-stream", "{path}");
        }
    }
}
