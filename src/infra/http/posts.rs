use axum::{
    Form,
    extract::{FromRequest, Path, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use tracing::warn;

use crate::{
    application::{
        auth::Viewer,
        error::HttpError,
        forms::{CommentFormInput, ImageUpload, PostFormInput},
        posts::{EditAccess, EditOutcome, PostError},
    },
    domain::entities::PostEntry,
    presentation::views::{
        LayoutContext, PostDetailView, PostFormTemplate, PostFormView, PostTemplate, post_href,
        render_template_response,
    },
};

use super::{HttpState, parse_post_id, session::CurrentViewer, session::RequireUser};

const SOURCE: &str = "infra::http::posts";

/// Post form submission, accepted as urlencoded or multipart.
/// Only multipart bodies can carry an image.
pub(super) struct PostSubmission(pub PostFormInput);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UrlencodedPostForm {
    text: String,
    group: Option<String>,
}

impl<S> FromRequest<S> for PostSubmission
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(form) = Form::<UrlencodedPostForm>::from_request(request, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Ok(Self(PostFormInput {
                text: form.text,
                group: form.group,
                image: None,
            }));
        }

        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let mut input = PostFormInput::default();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        status = err.status().as_u16(),
                        error = %err,
                        "failed to read multipart field"
                    );
                    return Err(invalid_payload(err.status(), err.to_string()));
                }
            };

            match field.name() {
                Some("text") => {
                    input.text = field
                        .text()
                        .await
                        .map_err(|err| invalid_payload(err.status(), err.to_string()))?;
                }
                Some("group") => {
                    input.group = Some(
                        field
                            .text()
                            .await
                            .map_err(|err| invalid_payload(err.status(), err.to_string()))?,
                    );
                }
                Some("image") => {
                    let file_name = field
                        .file_name()
                        .map(|value| value.to_string())
                        .filter(|value| !value.trim().is_empty())
                        .unwrap_or_else(|| "image".to_string());
                    let data = field
                        .bytes()
                        .await
                        .map_err(|err| invalid_payload(err.status(), err.to_string()))?;
                    // Browsers send an empty part when no file was chosen.
                    if !data.is_empty() {
                        input.image = Some(ImageUpload { file_name, data });
                    }
                }
                _ => continue,
            }
        }

        Ok(Self(input))
    }
}

fn invalid_payload(status: StatusCode, detail: String) -> Response {
    HttpError::new(SOURCE, status, "Invalid form submission", detail).into_response()
}

fn not_found(username: &str, raw_id: &str) -> HttpError {
    HttpError::not_found(SOURCE, format!("post `{raw_id}` by `{username}` not found"))
}

pub(super) async fn new_form(
    State(state): State<HttpState>,
    user: RequireUser,
) -> Result<Response, HttpError> {
    let groups = state.posts.group_choices().await?;
    Ok(render_form(
        &user.viewer(),
        PostFormView::create(&groups),
        "New post",
    ))
}

pub(super) async fn create(
    State(state): State<HttpState>,
    user: RequireUser,
    PostSubmission(input): PostSubmission,
) -> Result<Response, HttpError> {
    match state.posts.create(&user.0, &input).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(PostError::Invalid(errors)) => {
            let groups = state.posts.group_choices().await?;
            let view = PostFormView::create(&groups).with_submission(
                &input.text,
                input.group.as_deref(),
                &groups,
                errors,
            );
            Ok(render_form(&user.viewer(), view, "New post"))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn detail(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    Path((username, raw_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&raw_id).ok_or_else(|| not_found(&username, &raw_id))?;
    let detail = state.posts.detail(&username, post_id).await?;
    let view = PostDetailView::new(&detail.entry, &detail.comments, &viewer);
    Ok(render_detail(&viewer, &detail.entry, view))
}

pub(super) async fn edit_form(
    State(state): State<HttpState>,
    user: RequireUser,
    Path((username, raw_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&raw_id).ok_or_else(|| not_found(&username, &raw_id))?;
    match state.posts.edit_access(&user.0, &username, post_id).await? {
        EditAccess::Granted(entry) => {
            let groups = state.posts.group_choices().await?;
            Ok(render_form(
                &user.viewer(),
                PostFormView::edit(&entry, &groups),
                "Edit post",
            ))
        }
        EditAccess::Denied => Ok(Redirect::to(&post_href(&username, post_id)).into_response()),
    }
}

pub(super) async fn update(
    State(state): State<HttpState>,
    user: RequireUser,
    Path((username, raw_id)): Path<(String, String)>,
    PostSubmission(input): PostSubmission,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&raw_id).ok_or_else(|| not_found(&username, &raw_id))?;
    match state.posts.edit(&user.0, &username, post_id, &input).await {
        Ok(EditOutcome::Updated(_) | EditOutcome::Denied) => {
            Ok(Redirect::to(&post_href(&username, post_id)).into_response())
        }
        Err(PostError::Invalid(errors)) => {
            let entry = state.posts.find(&username, post_id).await?;
            let groups = state.posts.group_choices().await?;
            let view = PostFormView::edit(&entry, &groups).with_submission(
                &input.text,
                input.group.as_deref(),
                &groups,
                errors,
            );
            Ok(render_form(&user.viewer(), view, "Edit post"))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    user: RequireUser,
    Path((username, raw_id)): Path<(String, String)>,
    Form(input): Form<CommentFormInput>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&raw_id).ok_or_else(|| not_found(&username, &raw_id))?;
    match state
        .posts
        .add_comment(&user.0, &username, post_id, &input)
        .await
    {
        Ok(_) => Ok(Redirect::to(&post_href(&username, post_id)).into_response()),
        Err(PostError::Invalid(errors)) => {
            let viewer = user.viewer();
            let detail = state.posts.detail(&username, post_id).await?;
            let view = PostDetailView::new(&detail.entry, &detail.comments, &viewer)
                .with_comment_errors(input.text, errors);
            Ok(render_detail(&viewer, &detail.entry, view))
        }
        Err(err) => Err(err.into()),
    }
}

fn render_form(viewer: &Viewer, form: PostFormView, title: &str) -> Response {
    let view = LayoutContext::new(viewer, title, form);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

fn render_detail(viewer: &Viewer, entry: &PostEntry, view: PostDetailView) -> Response {
    let title = entry.post.to_string();
    let view = LayoutContext::new(viewer, title, view);
    render_template_response(PostTemplate { view }, StatusCode::OK)
}
