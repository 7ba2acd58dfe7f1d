//! Post authoring, editing, detail pages and comments.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::forms::{
    CommentFormInput, FieldErrors, INVALID_CHOICE_MESSAGE, PostFormData, PostFormInput,
};
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentEntry, CommentRecord, GroupRecord, PostEntry, PostRecord, UserSummary};
use crate::infra::uploads::{UploadStorage, UploadStorageError};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post {post_id} by `{username}` not found")]
    NotFound { username: String, post_id: i64 },
    #[error("form is invalid")]
    Invalid(FieldErrors),
    #[error("failed to store image")]
    Storage(#[from] UploadStorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Result of checking whether a user may edit a post.
#[derive(Debug, Clone)]
pub enum EditAccess {
    Granted(PostEntry),
    /// The user is not the author; the caller should send them to the detail view.
    Denied,
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    Updated(PostRecord),
    Denied,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub entry: PostEntry,
    pub comments: Vec<CommentEntry>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    uploads: Arc<UploadStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        uploads: Arc<UploadStorage>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            uploads,
        }
    }

    /// Groups offered as choices on the post form.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    /// Load a post addressed as `/<username>/<post_id>/`.
    pub async fn find(&self, username: &str, post_id: i64) -> Result<PostEntry, PostError> {
        self.posts
            .find_post_entry(post_id)
            .await?
            .filter(|entry| entry.author.username == username)
            .ok_or_else(|| PostError::NotFound {
                username: username.to_string(),
                post_id,
            })
    }

    pub async fn detail(&self, username: &str, post_id: i64) -> Result<PostDetail, PostError> {
        let entry = self.find(username, post_id).await?;
        let comments = self.comments.list_comments(entry.post.id).await?;
        Ok(PostDetail { entry, comments })
    }

    pub async fn create(
        &self,
        author: &UserSummary,
        input: &PostFormInput,
    ) -> Result<PostRecord, PostError> {
        let data = self.validate(input).await?;
        let group_id = data.group_id;
        let image = self.store_image(&data).await?;

        let post = match self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text: data.text,
                group_id,
                image: image.clone(),
            })
            .await
        {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                return Err(write_error(err, group_id));
            }
        };

        info!(
            target = "folio::application::posts",
            post_id = post.id,
            author = %author.username,
            group_id = ?post.group_id,
            "post created"
        );
        Ok(post)
    }

    pub async fn edit_access(
        &self,
        editor: &UserSummary,
        username: &str,
        post_id: i64,
    ) -> Result<EditAccess, PostError> {
        let entry = self.find(username, post_id).await?;
        if entry.post.author_id != editor.id {
            return Ok(EditAccess::Denied);
        }
        Ok(EditAccess::Granted(entry))
    }

    /// Apply an edit. Non-authors get [`EditOutcome::Denied`] and nothing changes.
    pub async fn edit(
        &self,
        editor: &UserSummary,
        username: &str,
        post_id: i64,
        input: &PostFormInput,
    ) -> Result<EditOutcome, PostError> {
        let entry = match self.edit_access(editor, username, post_id).await? {
            EditAccess::Granted(entry) => entry,
            EditAccess::Denied => {
                warn!(
                    target = "folio::application::posts",
                    post_id,
                    editor = %editor.username,
                    "edit attempt by non-author ignored"
                );
                return Ok(EditOutcome::Denied);
            }
        };

        let data = self.validate(input).await?;
        let group_id = data.group_id;
        let previous_image = entry.post.image.clone();
        let fresh_image = self.store_image(&data).await?;
        let image = fresh_image.clone().or_else(|| previous_image.clone());

        let post = match self
            .writer
            .update_post(UpdatePostParams {
                id: entry.post.id,
                text: data.text,
                group_id,
                image: image.clone(),
            })
            .await
        {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(fresh_image.as_deref()).await;
                return Err(write_error(err, group_id));
            }
        };

        if let Some(old) = previous_image
            && image.as_deref() != Some(old.as_str())
        {
            self.discard_image(Some(old.as_str())).await;
        }

        info!(
            target = "folio::application::posts",
            post_id = post.id,
            editor = %editor.username,
            "post updated"
        );
        Ok(EditOutcome::Updated(post))
    }

    pub async fn add_comment(
        &self,
        author: &UserSummary,
        username: &str,
        post_id: i64,
        input: &CommentFormInput,
    ) -> Result<CommentRecord, PostError> {
        let entry = self.find(username, post_id).await?;
        let text = input.validate().map_err(PostError::Invalid)?;

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: entry.post.id,
                author_id: author.id,
                text,
            })
            .await?;

        info!(
            target = "folio::application::posts",
            post_id = entry.post.id,
            comment_id = comment.id,
            author = %author.username,
            "comment added"
        );
        Ok(comment)
    }

    /// Runs the form checks and the group lookup together so every field
    /// error is reported in one pass.
    async fn validate(&self, input: &PostFormInput) -> Result<PostFormData, PostError> {
        let (data, mut errors) = match input.validate() {
            Ok(data) => (Some(data), FieldErrors::new()),
            Err(errors) => (None, errors),
        };
        if !errors.has("group")
            && let Some(group_id) = input.group_id()
            && self.groups.find_group_by_id(group_id).await?.is_none()
        {
            errors.add("group", INVALID_CHOICE_MESSAGE);
        }
        match data {
            Some(data) if errors.is_empty() => Ok(data),
            _ => Err(PostError::Invalid(errors)),
        }
    }

    async fn store_image(&self, data: &PostFormData) -> Result<Option<String>, PostError> {
        let Some(image) = data.image.as_ref() else {
            return Ok(None);
        };
        let stored = self
            .uploads
            .store_post_image(&image.file_name, image.data.clone())
            .await?;
        info!(
            target = "folio::application::posts",
            path = %stored.stored_path,
            checksum = %stored.checksum,
            size_bytes = stored.size_bytes,
            "post image stored"
        );
        Ok(Some(stored.stored_path))
    }

    async fn discard_image(&self, path: Option<&str>) {
        let Some(path) = path else {
            return;
        };
        if let Err(err) = self.uploads.delete(path).await {
            warn!(
                target = "folio::application::posts",
                path = %path,
                error = %err,
                "failed to remove unused image"
            );
        }
    }
}

/// A foreign-key failure on a post write means the chosen group vanished
/// after validation.
fn write_error(err: RepoError, group_id: Option<i64>) -> PostError {
    match err {
        RepoError::InvalidInput { .. } if group_id.is_some() => PostError::Invalid(
            FieldErrors::single("group", INVALID_CHOICE_MESSAGE),
        ),
        other => PostError::Repo(other),
    }
}
