use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};
use tracing::error;

use crate::application::{
    auth::Viewer,
    error::HttpError,
    forms::FieldErrors,
    pagination::{Page, PageWindow},
};
use crate::domain::entities::{AuthorStats, CommentEntry, GroupRecord, PostEntry, UserSummary};

const SITE_NAME: &str = "Folio";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Render the custom error page. Falls back to plain text when the template
/// itself cannot be rendered, so this never recurses into [`HttpError`].
pub fn render_error_page(view: ErrorPageView) -> Response {
    let status = StatusCode::from_u16(view.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let fallback = format!("{} {}", view.status, view.title);
    let template = ErrorTemplate {
        view: LayoutContext::new(&Viewer::anonymous(), view.title.clone(), view),
    };

    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!(
                target = "folio::presentation::views",
                error = %err,
                "failed to render error page"
            );
            (status, fallback).into_response()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerView {
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Clone)]
pub struct LayoutContext<T> {
    pub title: String,
    pub site_name: &'static str,
    pub viewer: Option<ViewerView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(viewer: &Viewer, title: impl Into<String>, content: T) -> Self {
        Self {
            title: title.into(),
            site_name: SITE_NAME,
            viewer: viewer.user().map(|user| ViewerView {
                username: user.username.clone(),
                full_name: user.full_name.clone(),
            }),
            content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupLinkView {
    pub title: String,
    pub href: String,
}

impl From<&GroupRecord> for GroupLinkView {
    fn from(group: &GroupRecord) -> Self {
        Self {
            title: group.title.clone(),
            href: group_href(&group.slug),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub author_name: String,
    pub author_href: String,
    pub group: Option<GroupLinkView>,
    pub published: String,
    pub iso_date: String,
    pub image_url: Option<String>,
    pub comment_count: i64,
    pub detail_href: String,
    /// Present only when the viewer wrote the post.
    pub edit_href: Option<String>,
}

impl PostCard {
    pub fn from_entry(entry: &PostEntry, viewer: &Viewer) -> Self {
        let detail_href = post_href(&entry.author.username, entry.post.id);
        let is_author = viewer
            .user()
            .is_some_and(|user| user.id == entry.post.author_id);

        Self {
            id: entry.post.id,
            text: entry.post.text.clone(),
            author_name: entry.author.full_name.clone(),
            author_href: profile_href(&entry.author.username),
            group: entry.group.as_ref().map(GroupLinkView::from),
            published: format_date(entry.post.pub_date),
            iso_date: format_iso(entry.post.pub_date),
            image_url: entry.post.image.as_deref().map(upload_href),
            comment_count: entry.comment_count,
            edit_href: is_author.then(|| format!("{detail_href}edit/")),
            detail_href,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatorView {
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub first_href: Option<String>,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub last_href: Option<String>,
}

impl PaginatorView {
    pub fn from_window(window: &PageWindow) -> Self {
        Self {
            number: window.number,
            num_pages: window.num_pages,
            total_count: window.total_count,
            first_href: window.has_previous().then(|| page_href(1)),
            previous_href: window.previous_number().map(page_href),
            next_href: window.next_number().map(page_href),
            last_href: window.has_next().then(|| page_href(window.num_pages)),
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

#[derive(Debug, Clone)]
pub struct FeedView {
    pub heading: String,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl FeedView {
    pub fn new(heading: impl Into<String>, page: &Page<PostEntry>, viewer: &Viewer) -> Self {
        Self {
            heading: heading.into(),
            posts: cards(page, viewer),
            paginator: PaginatorView::from_window(&page.window),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedView>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedView>,
}

#[derive(Debug, Clone)]
pub struct GroupView {
    pub title: String,
    pub description: String,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl GroupView {
    pub fn new(group: &GroupRecord, page: &Page<PostEntry>, viewer: &Viewer) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            posts: cards(page, viewer),
            paginator: PaginatorView::from_window(&page.window),
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupView>,
}

#[derive(Debug, Clone)]
pub struct ProfileView {
    pub username: String,
    pub full_name: String,
    pub post_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub following: bool,
    /// Follow controls are hidden from anonymous viewers and from the author.
    pub show_follow_controls: bool,
    pub follow_action: String,
    pub unfollow_action: String,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl ProfileView {
    pub fn new(
        author: &UserSummary,
        stats: AuthorStats,
        following: bool,
        page: &Page<PostEntry>,
        viewer: &Viewer,
    ) -> Self {
        let show_follow_controls = viewer.user().is_some_and(|user| user.id != author.id);
        let base = profile_href(&author.username);
        Self {
            username: author.username.clone(),
            full_name: author.full_name.clone(),
            post_count: stats.posts,
            follower_count: stats.followers,
            following_count: stats.following,
            following,
            show_follow_controls,
            follow_action: format!("{base}follow/"),
            unfollow_action: format!("{base}unfollow/"),
            posts: cards(page, viewer),
            paginator: PaginatorView::from_window(&page.window),
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub author_name: String,
    pub author_href: String,
    pub text: String,
    pub created: String,
    pub iso_date: String,
}

impl From<&CommentEntry> for CommentView {
    fn from(entry: &CommentEntry) -> Self {
        Self {
            author_name: entry.author.full_name.clone(),
            author_href: profile_href(&entry.author.username),
            text: entry.comment.text.clone(),
            created: format_date(entry.comment.created),
            iso_date: format_iso(entry.comment.created),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommentFormView {
    pub action: String,
    pub text: String,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone)]
pub struct PostDetailView {
    pub post: PostCard,
    pub comments: Vec<CommentView>,
    /// Only signed-in viewers get a comment form.
    pub comment_form: Option<CommentFormView>,
}

impl PostDetailView {
    pub fn new(entry: &PostEntry, comments: &[CommentEntry], viewer: &Viewer) -> Self {
        let post = PostCard::from_entry(entry, viewer);
        let comment_form = viewer.user().map(|_| CommentFormView {
            action: format!("{}comment/", post.detail_href),
            ..CommentFormView::default()
        });
        Self {
            post,
            comments: comments.iter().map(CommentView::from).collect(),
            comment_form,
        }
    }

    /// Keep the rejected comment text and its errors on the re-rendered page.
    pub fn with_comment_errors(mut self, text: String, errors: FieldErrors) -> Self {
        if let Some(form) = self.comment_form.as_mut() {
            form.text = text;
            form.errors = errors;
        }
        self
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailView>,
}

#[derive(Debug, Clone)]
pub struct GroupOptionView {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

#[derive(Debug, Clone)]
pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOptionView>,
    pub current_image: Option<String>,
    pub errors: FieldErrors,
}

impl PostFormView {
    pub fn create(groups: &[GroupRecord]) -> Self {
        Self {
            is_edit: false,
            action: "/new/".to_string(),
            text: String::new(),
            groups: group_options(groups, None),
            current_image: None,
            errors: FieldErrors::new(),
        }
    }

    pub fn edit(entry: &PostEntry, groups: &[GroupRecord]) -> Self {
        Self {
            is_edit: true,
            action: format!("{}edit/", post_href(&entry.author.username, entry.post.id)),
            text: entry.post.text.clone(),
            groups: group_options(groups, entry.post.group_id.map(|id| id.to_string()).as_deref()),
            current_image: entry.post.image.as_deref().map(upload_href),
            errors: FieldErrors::new(),
        }
    }

    /// Refill the form with what the user submitted.
    pub fn with_submission(
        mut self,
        text: &str,
        group: Option<&str>,
        groups: &[GroupRecord],
        errors: FieldErrors,
    ) -> Self {
        self.text = text.to_string();
        self.groups = group_options(groups, group);
        self.errors = errors;
        self
    }
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

#[derive(Debug, Clone, Default)]
pub struct LoginView {
    pub username: String,
    pub next: Option<String>,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginView>,
}

#[derive(Debug, Clone, Default)]
pub struct SignupView {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupView>,
}

#[derive(Template)]
#[template(path = "about/author.html")]
pub struct AboutAuthorTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "about/tech.html")]
pub struct AboutTechTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Debug, Clone)]
pub struct ErrorPageView {
    pub status: u16,
    pub title: String,
    pub message: String,
    /// The missing path, echoed back on 404 pages.
    pub path: Option<String>,
}

impl ErrorPageView {
    pub fn for_status(status: StatusCode, public_message: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self {
                status: status.as_u16(),
                title: "Page not found".to_string(),
                message: public_message.to_string(),
                path: None,
            },
            status if status.is_server_error() => Self {
                status: status.as_u16(),
                title: "Server error".to_string(),
                message: "Something went wrong on our side. Please try again later.".to_string(),
                path: None,
            },
            status => Self {
                status: status.as_u16(),
                title: status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string(),
                message: public_message.to_string(),
                path: None,
            },
        }
    }

    pub fn not_found_at(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::for_status(StatusCode::NOT_FOUND, "Page not found")
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{username}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn post_href(username: &str, post_id: i64) -> String {
    format!("/{username}/{post_id}/")
}

pub fn upload_href(stored_path: &str) -> String {
    format!("/uploads/{stored_path}")
}

fn page_href(number: u64) -> String {
    format!("?page={number}")
}

fn cards(page: &Page<PostEntry>, viewer: &Viewer) -> Vec<PostCard> {
    page.items
        .iter()
        .map(|entry| PostCard::from_entry(entry, viewer))
        .collect()
}

fn group_options(groups: &[GroupRecord], selected: Option<&str>) -> Vec<GroupOptionView> {
    let selected = selected.and_then(|raw| raw.trim().parse::<i64>().ok());
    groups
        .iter()
        .map(|group| GroupOptionView {
            id: group.id,
            title: group.title.clone(),
            selected: Some(group.id) == selected,
        })
        .collect()
}

fn format_date(value: OffsetDateTime) -> String {
    value
        .format(format_description!(
            "[day] [month repr:short] [year], [hour]:[minute]"
        ))
        .unwrap_or_else(|_| value.to_string())
}

fn format_iso(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::PostRecord;
    use time::macros::datetime;

    fn entry(author_id: i64) -> PostEntry {
        PostEntry {
            post: PostRecord {
                id: 7,
                text: "Hello there".to_string(),
                pub_date: datetime!(2024-03-05 14:30 UTC),
                author_id,
                group_id: None,
                image: Some("posts/abc-cat.png".to_string()),
            },
            author: UserSummary {
                id: author_id,
                username: "leo".to_string(),
                full_name: "Leo Tolstoy".to_string(),
            },
            group: None,
            comment_count: 2,
        }
    }

    fn viewer(id: i64) -> Viewer {
        Viewer::authenticated(UserSummary {
            id,
            username: format!("user{id}"),
            full_name: format!("User {id}"),
        })
    }

    #[test]
    fn post_card_links_edit_only_for_author() {
        let card = PostCard::from_entry(&entry(1), &viewer(1));
        assert_eq!(card.detail_href, "/leo/7/");
        assert_eq!(card.edit_href.as_deref(), Some("/leo/7/edit/"));
        assert_eq!(card.image_url.as_deref(), Some("/uploads/posts/abc-cat.png"));
        assert_eq!(card.published, "05 Mar 2024, 14:30");

        let card = PostCard::from_entry(&entry(1), &viewer(2));
        assert!(card.edit_href.is_none());
        let card = PostCard::from_entry(&entry(1), &Viewer::anonymous());
        assert!(card.edit_href.is_none());
    }

    #[test]
    fn paginator_links_follow_window() {
        let window = PageWindow {
            number: 2,
            num_pages: 3,
            total_count: 25,
            offset: 10,
            limit: 10,
        };
        let view = PaginatorView::from_window(&window);
        assert_eq!(view.previous_href.as_deref(), Some("?page=1"));
        assert_eq!(view.next_href.as_deref(), Some("?page=3"));
        assert_eq!(view.last_href.as_deref(), Some("?page=3"));
        assert!(view.is_paginated());
    }

    #[test]
    fn error_page_hides_server_error_details() {
        let view = ErrorPageView::for_status(StatusCode::INTERNAL_SERVER_ERROR, "db exploded");
        assert!(!view.message.contains("db exploded"));

        let view = ErrorPageView::not_found_at("/missing/");
        assert_eq!(view.status, 404);
        assert_eq!(view.path.as_deref(), Some("/missing/"));
    }

    #[test]
    fn error_page_renders_with_its_status() {
        let response = render_error_page(ErrorPageView::not_found_at("/nowhere/"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
