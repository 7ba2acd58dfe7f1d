use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};

use crate::{application::error::HttpError, presentation::views::profile_href};

use super::{HttpState, session::RequireUser};

pub(super) async fn follow(
    State(state): State<HttpState>,
    user: RequireUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    state.follows.follow(&user.0, &username).await?;
    Ok(Redirect::to(&profile_href(&username)).into_response())
}

pub(super) async fn unfollow(
    State(state): State<HttpState>,
    user: RequireUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    state.follows.unfollow(&user.0, &username).await?;
    Ok(Redirect::to(&profile_href(&username)).into_response())
}
