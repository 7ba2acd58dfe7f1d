use std::num::NonZeroU32;
use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo};
use crate::domain::entities::{AuthorStats, GroupRecord, PostEntry, UserSummary};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostEntry>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserSummary,
    pub stats: AuthorStats,
    /// Whether the viewer already follows `author`. Always false for
    /// anonymous viewers and for the author looking at their own profile.
    pub following: bool,
    pub page: Page<PostEntry>,
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    page_size: NonZeroU32,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        page_size: NonZeroU32,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            page_size,
        }
    }

    pub async fn index(&self, page: Option<&str>) -> Result<Page<PostEntry>, FeedError> {
        self.page(PostScope::All, page).await
    }

    pub async fn group(&self, slug: &str, page: Option<&str>) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_group_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;
        let page = self.page(PostScope::Group(group.id), page).await?;
        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&UserSummary>,
        page: Option<&str>,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))?;

        let following = match viewer {
            Some(viewer) if viewer.id != author.id => {
                self.follows.is_following(viewer.id, author.id).await?
            }
            _ => false,
        };

        let stats = self.users.author_stats(author.id).await?;
        let page = self.page(PostScope::Author(author.id), page).await?;

        Ok(ProfileFeed {
            author: author.summary(),
            stats,
            following,
            page,
        })
    }

    /// Posts by authors that `viewer` follows.
    pub async fn following(
        &self,
        viewer: &UserSummary,
        page: Option<&str>,
    ) -> Result<Page<PostEntry>, FeedError> {
        self.page(PostScope::FollowedBy(viewer.id), page).await
    }

    async fn page(&self, scope: PostScope, raw_page: Option<&str>) -> Result<Page<PostEntry>, FeedError> {
        let total = self.posts.count_posts(scope).await?;
        let window = Paginator::new(total, self.page_size).window(raw_page);
        let items = self
            .posts
            .list_posts(scope, window.offset, window.limit)
            .await?;
        Ok(Page { items, window })
    }
}
