use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::{UserRecord, UserSummary};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("`{user}` does not follow `{author}`")]
    NotFollowing { user: String, author: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    /// Self-follows are dropped without touching storage.
    IgnoredSelf,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        user: &UserSummary,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.author(username).await?;
        if author.id == user.id {
            return Ok(FollowOutcome::IgnoredSelf);
        }

        if self.follows.is_following(user.id, author.id).await? {
            return Ok(FollowOutcome::AlreadyFollowing);
        }

        self.follows.create_follow(user.id, author.id).await?;
        info!(
            target = "folio::application::follows",
            user = %user.username,
            author = %author.username,
            "follow edge created"
        );
        Ok(FollowOutcome::Followed)
    }

    pub async fn unfollow(&self, user: &UserSummary, username: &str) -> Result<(), FollowError> {
        let author = self.author(username).await?;
        let removed = self.follows.delete_follow(user.id, author.id).await?;
        if !removed {
            return Err(FollowError::NotFollowing {
                user: user.username.clone(),
                author: author.username,
            });
        }

        info!(
            target = "folio::application::follows",
            user = %user.username,
            author = %author.username,
            "follow edge removed"
        );
        Ok(())
    }

    async fn author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
