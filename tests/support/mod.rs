//! In-memory repositories and state builders shared by the integration tests.

#![allow(dead_code)]

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use folio::application::auth::{AuthService, hash_password};
use folio::application::feed::FeedService;
use folio::application::follows::FollowService;
use folio::application::posts::PostService;
use folio::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateSessionParams,
    CreateUserParams, FollowsRepo, GroupsRepo, HealthRepo, PostScope, PostsRepo, PostsWriteRepo,
    RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
};
use folio::cache::{CacheState, PageCache};
use folio::domain::entities::{
    AuthorStats, CommentEntry, CommentRecord, FollowRecord, GroupRecord, PostEntry, PostRecord,
    SessionRecord, UserRecord, UserSummary,
};
use folio::infra::http::HttpState;
use folio::infra::uploads::UploadStorage;

pub const PASSWORD: &str = "correct-horse-battery";

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
    clock: Option<OffsetDateTime>,
    reject_next_post_write: bool,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so feed order is deterministic.
    fn tick(&mut self) -> OffsetDateTime {
        let next = match self.clock {
            Some(previous) => previous + Duration::from_secs(1),
            None => OffsetDateTime::now_utc(),
        };
        self.clock = Some(next);
        next
    }

    fn summary(&self, user_id: i64) -> Result<UserSummary, RepoError> {
        self.users
            .iter()
            .find(|user| user.id == user_id)
            .map(UserRecord::summary)
            .ok_or_else(|| RepoError::Integrity {
                message: format!("user {user_id} does not exist"),
            })
    }

    fn entry(&self, post: &PostRecord) -> Result<PostEntry, RepoError> {
        Ok(PostEntry {
            post: post.clone(),
            author: self.summary(post.author_id)?,
            group: post
                .group_id
                .and_then(|id| self.groups.iter().find(|group| group.id == id).cloned()),
            comment_count: self
                .comments
                .iter()
                .filter(|comment| comment.post_id == post.id)
                .count() as i64,
        })
    }

    /// Mirrors the `posts.group_id` foreign key and the one-shot write failure.
    fn check_post_write(&mut self, group_id: Option<i64>) -> Result<(), RepoError> {
        let group_missing =
            group_id.is_some_and(|id| !self.groups.iter().any(|group| group.id == id));
        if std::mem::take(&mut self.reject_next_post_write) || group_missing {
            return Err(RepoError::InvalidInput {
                message: "insert or update on table \"posts\" violates foreign key constraint"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn in_scope(&self, post: &PostRecord, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => post.group_id == Some(group_id),
            PostScope::Author(author_id) => post.author_id == author_id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|edge| edge.user_id == user_id && edge.author_id == post.author_id),
        }
    }
}

/// Every repository trait backed by one set of in-memory tables.
#[derive(Default)]
pub struct MemoryRepos {
    tables: Mutex<Tables>,
}

impl MemoryRepos {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a user whose password is [`PASSWORD`].
    pub async fn seed_user(&self, username: &str) -> UserSummary {
        let password_hash = hash_password(PASSWORD).expect("hash password");
        self.insert_user(username, password_hash).await
    }

    /// Insert a user that can never log in.
    pub async fn seed_user_without_password(&self, username: &str) -> UserSummary {
        self.insert_user(username, "!".to_string()).await
    }

    async fn insert_user(&self, username: &str, password_hash: String) -> UserSummary {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let joined_at = tables.tick();
        let user = UserRecord {
            id,
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            password_hash,
            joined_at,
        };
        let summary = user.summary();
        tables.users.push(user);
        summary
    }

    pub async fn seed_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        })
        .await
        .expect("seed group")
    }

    pub async fn seed_post(&self, author: &UserSummary, text: &str, group_id: Option<i64>) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id,
            image: None,
        })
        .await
        .expect("seed post")
    }

    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    pub async fn follow_count(&self) -> usize {
        self.tables.lock().await.follows.len()
    }

    pub async fn comment_count(&self) -> usize {
        self.tables.lock().await.comments.len()
    }

    pub async fn post(&self, id: i64) -> Option<PostRecord> {
        self.tables
            .lock()
            .await
            .posts
            .iter()
            .find(|post| post.id == id)
            .cloned()
    }

    pub async fn latest_post_by(&self, author_id: i64) -> Option<PostRecord> {
        self.tables
            .lock()
            .await
            .posts
            .iter()
            .filter(|post| post.author_id == author_id)
            .max_by_key(|post| post.id)
            .cloned()
    }

    /// Make the next post insert or update fail as if its group had just
    /// been deleted.
    pub async fn reject_next_post_write(&self) {
        self.tables.lock().await.reject_next_post_write = true;
    }

    /// Overwrite a post's text directly, bypassing the service layer.
    pub async fn rewrite_post(&self, id: i64, text: &str) {
        let mut tables = self.tables.lock().await;
        if let Some(post) = tables.posts.iter_mut().find(|post| post.id == id) {
            post.text = text.to_string();
        }
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let id = tables.next_id();
        let joined_at = tables.tick();
        let user = UserRecord {
            id,
            username: params.username,
            first_name: params.first_name,
            last_name: params.last_name,
            email: params.email,
            password_hash: params.password_hash,
            joined_at,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn author_stats(&self, author_id: i64) -> Result<AuthorStats, RepoError> {
        let tables = self.tables.lock().await;
        Ok(AuthorStats {
            posts: tables
                .posts
                .iter()
                .filter(|post| post.author_id == author_id)
                .count() as i64,
            followers: tables
                .follows
                .iter()
                .filter(|edge| edge.author_id == author_id)
                .count() as i64,
            following: tables
                .follows
                .iter()
                .filter(|edge| edge.user_id == author_id)
                .count() as i64,
        })
    }
}

#[async_trait]
impl GroupsRepo for MemoryRepos {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.tables.lock().await.groups.clone();
        groups.sort_by_key(|group| group.title.to_lowercase());
        Ok(groups)
    }

    async fn find_group_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: tables.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl PostsRepo for MemoryRepos {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .filter(|post| tables.in_scope(post, scope))
            .count() as u64)
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<PostEntry>, RepoError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&PostRecord> = tables
            .posts
            .iter()
            .filter(|post| tables.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|post| tables.entry(post))
            .collect()
    }

    async fn find_post_entry(&self, id: i64) -> Result<Option<PostEntry>, RepoError> {
        let tables = self.tables.lock().await;
        tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| tables.entry(post))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepos {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.summary(params.author_id)?;
        tables.check_post_write(params.group_id)?;
        let post = PostRecord {
            id: tables.next_id(),
            text: params.text,
            pub_date: tables.tick(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.check_post_write(params.group_id)?;
        let post = tables
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        Ok(post.clone())
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepos {
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentEntry>, RepoError> {
        let tables = self.tables.lock().await;
        let mut comments = tables
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| {
                Ok(CommentEntry {
                    comment: comment.clone(),
                    author: tables.summary(comment.author_id)?,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;
        comments.sort_by(|a, b| {
            b.comment
                .created
                .cmp(&a.comment.created)
                .then(b.comment.id.cmp(&a.comment.id))
        });
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let comment = CommentRecord {
            id: tables.next_id(),
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created: tables.tick(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryRepos {
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id))
    }

    async fn create_follow(
        &self,
        user_id: i64,
        author_id: i64,
    ) -> Result<FollowRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if user_id == author_id {
            return Err(RepoError::Integrity {
                message: "follow_not_self".to_string(),
            });
        }
        if let Some(existing) = tables
            .follows
            .iter()
            .find(|edge| edge.user_id == user_id && edge.author_id == author_id)
        {
            return Ok(*existing);
        }
        let edge = FollowRecord {
            id: tables.next_id(),
            user_id,
            author_id,
        };
        tables.follows.push(edge);
        Ok(edge)
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|edge| !(edge.user_id == user_id && edge.author_id == author_id));
        Ok(tables.follows.len() != before)
    }
}

#[async_trait]
impl SessionsRepo for MemoryRepos {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let session = SessionRecord {
            id: tables.next_id(),
            user_id: params.user_id,
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        tables.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<SessionRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|session| session.prefix == prefix)
            .cloned())
    }

    async fn delete_session(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        tables.sessions.retain(|session| session.id != id);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|session| session.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl HealthRepo for MemoryRepos {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// A 2x1 GIF that passes the image checks.
pub const TINY_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00,
    0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];

/// Files currently stored under the post image directory, sorted.
pub fn stored_images(uploads: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(uploads.join("posts")) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| {
            let entry = entry.expect("dir entry");
            format!("posts/{}", entry.file_name().to_string_lossy())
        })
        .collect();
    names.sort();
    names
}

pub fn page_size(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).expect("non-zero page size")
}

pub fn feed_service(repos: &Arc<MemoryRepos>, per_page: u32) -> FeedService {
    FeedService::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        page_size(per_page),
    )
}

pub fn post_service(repos: &Arc<MemoryRepos>, uploads: &Path) -> PostService {
    PostService::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        Arc::new(UploadStorage::new(uploads.to_path_buf()).expect("upload storage")),
    )
}

pub fn follow_service(repos: &Arc<MemoryRepos>) -> FollowService {
    FollowService::new(repos.clone(), repos.clone())
}

pub fn auth_service(repos: &Arc<MemoryRepos>) -> AuthService {
    AuthService::new(repos.clone(), repos.clone(), Duration::from_secs(3600))
}

/// Full router state over `repos`; `cache_ttl` enables the home page cache.
pub fn http_state(repos: &Arc<MemoryRepos>, uploads: &Path, cache_ttl: Option<Duration>) -> HttpState {
    HttpState {
        feed: Arc::new(feed_service(repos, 10)),
        posts: Arc::new(post_service(repos, uploads)),
        follows: Arc::new(follow_service(repos)),
        auth: Arc::new(auth_service(repos)),
        health: repos.clone(),
        upload_storage: Arc::new(UploadStorage::new(uploads.to_path_buf()).expect("upload storage")),
        cache: cache_ttl.map(|ttl| CacheState::new(Arc::new(PageCache::new(ttl)))),
        secure_cookies: false,
        max_request_bytes: 1024 * 1024,
    }
}
