//! rinja page templates and the context types they render.

use actix_web::HttpResponse;
use chrono::{DateTime, Utc};
use rinja::Template;

use crate::error::PageError;
use crate::models::{Group, Id, User};
use crate::pagination::Page;

pub fn render<T: Template>(page: &T) -> Result<HttpResponse, PageError> {
    let body = page.render()?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

/// A post joined with the display data feeds need: author username and the
/// group it belongs to, if any.
#[derive(Debug, Clone)]
pub struct PostCard {
    pub id: Id,
    pub author: String,
    pub group: Option<GroupRef>,
    pub text: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GroupRef {
    pub title: String,
    pub slug: String,
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexPage {
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupListPage {
    pub group: Group,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfilePage {
    pub author: User,
    pub total: usize,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailPage {
    pub post: PostCard,
    pub author_posts: usize,
}

/// One `<option>` of the group selector.
#[derive(Debug, Clone)]
pub struct GroupChoice {
    pub id: Id,
    pub title: String,
    pub selected: bool,
}

/// Shared by the create and edit views; they differ only in heading, form
/// action and the bound values.
#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct PostFormPage {
    pub heading: &'static str,
    pub action: String,
    pub groups: Vec<GroupChoice>,
    pub text: String,
    pub error: Option<String>,
}

impl PostFormPage {
    pub fn create(groups: Vec<Group>, text: String, selected: Option<Id>) -> Self {
        Self::build("New post", "/create/".into(), groups, text, selected)
    }

    pub fn edit(post_id: Id, groups: Vec<Group>, text: String, selected: Option<Id>) -> Self {
        Self::build(
            "Edit post",
            format!("/posts/{post_id}/edit/"),
            groups,
            text,
            selected,
        )
    }

    fn build(
        heading: &'static str,
        action: String,
        groups: Vec<Group>,
        text: String,
        selected: Option<Id>,
    ) -> Self {
        let groups = groups
            .into_iter()
            .map(|g| GroupChoice {
                id: g.id,
                title: g.title,
                selected: selected == Some(g.id),
            })
            .collect();
        Self {
            heading,
            action,
            groups,
            text,
            error: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginPage {
    pub username: String,
    /// Path to return to after login; empty means the home page.
    pub next: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupPage {
    pub username: String,
    pub error: Option<String>,
}
