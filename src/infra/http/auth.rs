use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::warn;

use crate::{
    application::{
        auth::{AuthError, Viewer},
        error::HttpError,
        forms::{FieldErrors, LoginFormInput, NON_FIELD_ERRORS, SignupFormInput},
    },
    presentation::views::{
        LayoutContext, LoginTemplate, LoginView, SignupTemplate, SignupView,
        render_template_response,
    },
};

use super::{
    HttpState,
    session::{
        CurrentViewer, LOGIN_PATH, SESSION_COOKIE, removal_cookie, safe_next, session_cookie,
    },
};

const INVALID_LOGIN_MESSAGE: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const USERNAME_TAKEN_MESSAGE: &str = "A user with that username already exists.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: Option<String>,
}

pub(super) async fn login_form(
    CurrentViewer(viewer): CurrentViewer,
    Query(query): Query<NextQuery>,
) -> Response {
    render_login(
        &viewer,
        LoginView {
            next: safe_next(query.next.as_deref()),
            ..LoginView::default()
        },
    )
}

pub(super) async fn login(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    jar: CookieJar,
    Form(input): Form<LoginFormInput>,
) -> Result<Response, HttpError> {
    let next = safe_next(input.next.as_deref());
    let form_view = |errors: FieldErrors| LoginView {
        username: input.username.trim().to_string(),
        next: next.clone(),
        errors,
    };

    let (username, password) = match input.validate() {
        Ok(credentials) => credentials,
        Err(errors) => return Ok(render_login(&viewer, form_view(errors))),
    };

    match state.auth.login(&username, &password).await {
        Ok(session) => {
            let cookie = session_cookie(
                session.token,
                state.auth.session_ttl(),
                state.secure_cookies,
            );
            let target = next.clone().unwrap_or_else(|| "/".to_string());
            Ok((jar.add(cookie), Redirect::to(&target)).into_response())
        }
        Err(AuthError::InvalidCredentials) => Ok(render_login(
            &viewer,
            form_view(FieldErrors::single(NON_FIELD_ERRORS, INVALID_LOGIN_MESSAGE)),
        )),
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Err(err) = state.auth.logout(cookie.value()).await
    {
        warn!(
            target = "folio::http::auth",
            error = %err,
            "failed to delete session on logout"
        );
    }
    (jar.remove(removal_cookie()), Redirect::to("/")).into_response()
}

pub(super) async fn signup_form(CurrentViewer(viewer): CurrentViewer) -> Response {
    render_signup(&viewer, SignupView::default())
}

pub(super) async fn signup(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    Form(input): Form<SignupFormInput>,
) -> Result<Response, HttpError> {
    let form_view = |errors: FieldErrors| SignupView {
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        username: input.username.clone(),
        email: input.email.clone(),
        errors,
    };

    let data = match input.validate() {
        Ok(data) => data,
        Err(errors) => return Ok(render_signup(&viewer, form_view(errors))),
    };

    match state.auth.register(data).await {
        Ok(_) => Ok(Redirect::to(LOGIN_PATH).into_response()),
        Err(AuthError::UsernameTaken(_)) => Ok(render_signup(
            &viewer,
            form_view(FieldErrors::single("username", USERNAME_TAKEN_MESSAGE)),
        )),
        Err(err) => Err(err.into()),
    }
}

fn render_login(viewer: &Viewer, form: LoginView) -> Response {
    let view = LayoutContext::new(viewer, "Log in", form);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

fn render_signup(viewer: &Viewer, form: SignupView) -> Response {
    let view = LayoutContext::new(viewer, "Sign up", form);
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}
