use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::{GROUP_TITLE_MAX_CHARS, GroupRecord};
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugAsyncError, generate_unique_slug_async, validate_slug};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("group slug `{0}` already exists")]
    SlugTaken(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    /// Explicit slug; derived from the title when absent.
    pub slug: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupsRepo>) -> Self {
        Self { groups }
    }

    pub async fn list(&self) -> Result<Vec<GroupRecord>, GroupError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create(&self, command: CreateGroupCommand) -> Result<GroupRecord, GroupError> {
        let title = command.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("title", "must not be empty").into());
        }
        if title.chars().count() > GROUP_TITLE_MAX_CHARS {
            return Err(DomainError::validation(
                "title",
                format!("must be at most {GROUP_TITLE_MAX_CHARS} characters"),
            )
            .into());
        }

        let slug = match command.slug.map(|slug| slug.trim().to_string()) {
            Some(slug) if !slug.is_empty() => {
                validate_slug(&slug)
                    .map_err(|err| DomainError::validation("slug", err.to_string()))?;
                slug
            }
            _ => self.derive_unique_slug(&title).await?,
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title,
                slug: slug.clone(),
                description: command.description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => GroupError::SlugTaken(slug),
                other => GroupError::Repo(other),
            })?;

        info!(
            target = "folio::application::groups",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }

    async fn derive_unique_slug(&self, title: &str) -> Result<String, GroupError> {
        let groups = self.groups.clone();
        generate_unique_slug_async(title, move |candidate| {
            let groups = groups.clone();
            async move {
                groups
                    .find_group_by_slug(&candidate)
                    .await
                    .map(|existing| existing.is_none())
            }
        })
        .await
        .map_err(|err| match err {
            SlugAsyncError::Slug(err) => DomainError::validation("slug", err.to_string()).into(),
            SlugAsyncError::Predicate(err) => GroupError::Repo(err),
        })
    }
}
