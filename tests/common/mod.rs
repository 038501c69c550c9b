#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::test;
use std::sync::Arc;
use tempfile::TempDir;

use quill::auth::{create_session_jwt, SESSION_COOKIE};
use quill::models::*;
use quill::repo::inmem::InMemRepo;
use quill::repo::{GroupRepo, PostRepo, UserRepo};
use quill::routes::AppState;
use quill::storage::FsImageStore;

/// One-pixel GIF, enough for `infer` to recognize `image/gif`.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x06, 0x06,
    0x06, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02,
    0x02, 0x0c, 0x0a, 0x00, 0x3b,
];

/// Ensure the session secret is present and create a scratch media dir.
/// The returned guard must stay alive for the duration of the test.
pub fn setup_env() -> TempDir {
    std::env::set_var("SESSION_SECRET", "test-secret-must-be-32-bytes-long!!");
    tempfile::tempdir().unwrap()
}

pub fn app_state(repo: &InMemRepo, media: &TempDir) -> AppState {
    AppState {
        repo: Arc::new(repo.clone()),
        image_store: Arc::new(FsImageStore::new(media.path())),
    }
}

pub async fn seed_user(repo: &InMemRepo, username: &str) -> User {
    repo.create_user(NewUser {
        username: username.into(),
        // Tests force-login with a signed cookie, no password involved.
        password_hash: "!".into(),
    })
    .await
    .unwrap()
}

pub async fn seed_group(repo: &InMemRepo, title: &str, slug: &str) -> Group {
    repo.create_group(NewGroup {
        title: title.into(),
        slug: slug.into(),
        description: format!("About {title}"),
    })
    .await
    .unwrap()
}

pub async fn seed_post(
    repo: &InMemRepo,
    author: &User,
    group: Option<&Group>,
    text: &str,
) -> Post {
    repo.create_post(NewPost {
        author_id: author.id,
        group_id: group.map(|g| g.id),
        text: text.into(),
        image: None,
    })
    .await
    .unwrap()
}

/// The test-suite equivalent of a forced login.
pub fn login_cookie(user: &User) -> Cookie<'static> {
    let token = create_session_jwt(user.id, &user.username).unwrap();
    Cookie::build(SESSION_COOKIE, token).path("/").finish()
}

pub const MULTIPART_BOUNDARY: &str = "----quill-test-boundary";

pub fn multipart_content_type() -> (&'static str, String) {
    (
        "Content-Type",
        format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
    )
}

/// Build a multipart body for the post create/edit form.
pub fn post_form_body(text: &str, group: Option<Id>, image: Option<(&str, &[u8])>) -> Vec<u8> {
    let b = MULTIPART_BOUNDARY;
    let mut body: Vec<u8> = Vec::new();

    body.extend_from_slice(
        format!("--{b}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{text}\r\n")
            .as_bytes(),
    );

    let group_value = group.map(|id| id.to_string()).unwrap_or_default();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"group\"\r\n\r\n{group_value}\r\n"
        )
        .as_bytes(),
    );

    if let Some((filename, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{b}--\r\n").as_bytes());
    body
}

pub async fn body_string<B: MessageBody>(resp: ServiceResponse<B>) -> String {
    let bytes = test::read_body(resp).await;
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Number of feed entries rendered on a page.
pub fn count_cards(html: &str) -> usize {
    html.matches("<article class=\"post-card\"").count()
}

pub fn location<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(actix_web::http::header::LOCATION)
        .expect("redirect should carry a Location header")
        .to_str()
        .unwrap()
        .to_owned()
}
