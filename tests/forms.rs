#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use serial_test::serial;

use quill::models::NewUser;
use quill::repo::inmem::InMemRepo;
use quill::repo::{PostRepo, UserRepo};
use quill::{config, SecurityHeaders};

macro_rules! init_app {
    ($repo:expr, $media:expr) => {
        test::init_service(
            App::new()
                .wrap(SecurityHeaders::from_env())
                .app_data(web::Data::new(common::app_state($repo, $media)))
                .configure(config),
        )
        .await
    };
}

#[actix_web::test]
#[serial]
async fn create_form_persists_post_and_redirects_to_profile() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    let author = common::seed_user(&repo, "author").await;
    let group = common::seed_group(&repo, "Create group", "test-create-slug").await;
    let app = init_app!(&repo, &media);

    let before = repo.count_posts().await.unwrap();

    let req = test::TestRequest::post()
        .uri("/create/")
        .cookie(common::login_cookie(&author))
        .insert_header(common::multipart_content_type())
        .set_payload(common::post_form_body("A brand new post", Some(group.id), None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(common::location(&resp), "/profile/author/");

    assert_eq!(repo.count_posts().await.unwrap(), before + 1);
    let posts = repo.list_posts().await.unwrap();
    let created = &posts[0];
    assert_eq!(created.text, "A brand new post");
    assert_eq!(created.group_id, Some(group.id));
    assert_eq!(created.author_id, author.id);
}

#[actix_web::test]
#[serial]
async fn guest_create_is_rejected_without_persisting() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    let author = common::seed_user(&repo, "author").await;
    common::seed_post(&repo, &author, None, "Pre-existing").await;
    let app = init_app!(&repo, &media);

    let before = repo.count_posts().await.unwrap();

    let req = test::TestRequest::post()
        .uri("/create/")
        .insert_header(common::multipart_content_type())
        .set_payload(common::post_form_body("Guest post attempt", None, None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert!(common::location(&resp).starts_with("/auth/login/"));

    assert_eq!(repo.count_posts().await.unwrap(), before);
    let posts = repo.list_posts().await.unwrap();
    assert!(posts.iter().all(|p| p.text != "Guest post attempt"));
}

#[actix_web::test]
#[serial]
async fn edit_form_updates_text_and_group_but_never_author() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    let author = common::seed_user(&repo, "author").await;
    let group = common::seed_group(&repo, "Original group", "test-slug").await;
    let edited_group = common::seed_group(&repo, "Edited group", "test-edit-slug").await;
    let post = common::seed_post(&repo, &author, Some(&group), "Text before editing").await;
    let app = init_app!(&repo, &media);

    let req = test::TestRequest::post()
        .uri(&format!("/posts/{}/edit/", post.id))
        .cookie(common::login_cookie(&author))
        .insert_header(common::multipart_content_type())
        .set_payload(common::post_form_body(
            "Text after editing",
            Some(edited_group.id),
            None,
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(common::location(&resp), format!("/posts/{}/", post.id));

    let edited = repo.get_post(post.id).await.unwrap();
    assert_eq!(edited.author_id, post.author_id);
    assert_eq!(edited.group_id, Some(edited_group.id));
    assert_eq!(edited.text, "Text after editing");
}

#[actix_web::test]
#[serial]
async fn edit_by_non_author_is_a_404_and_changes_nothing() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    let author = common::seed_user(&repo, "author").await;
    let intruder = common::seed_user(&repo, "intruder").await;
    let post = common::seed_post(&repo, &author, None, "Untouchable").await;
    let app = init_app!(&repo, &media);

    let req = test::TestRequest::post()
        .uri(&format!("/posts/{}/edit/", post.id))
        .cookie(common::login_cookie(&intruder))
        .insert_header(common::multipart_content_type())
        .set_payload(common::post_form_body("Hijacked", None, None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let unchanged = repo.get_post(post.id).await.unwrap();
    assert_eq!(unchanged.text, "Untouchable");
    assert_eq!(unchanged.author_id, author.id);
}

#[actix_web::test]
#[serial]
async fn blank_text_rerenders_the_form_without_persisting() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    let author = common::seed_user(&repo, "author").await;
    let app = init_app!(&repo, &media);

    let req = test::TestRequest::post()
        .uri("/create/")
        .cookie(common::login_cookie(&author))
        .insert_header(common::multipart_content_type())
        .set_payload(common::post_form_body("   ", None, None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let html = common::body_string(resp).await;
    assert!(html.contains("This field is required."));

    assert_eq!(repo.count_posts().await.unwrap(), 0);
}

#[actix_web::test]
#[serial]
async fn unknown_group_in_form_is_a_404() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    let author = common::seed_user(&repo, "author").await;
    let app = init_app!(&repo, &media);

    let req = test::TestRequest::post()
        .uri("/create/")
        .cookie(common::login_cookie(&author))
        .insert_header(common::multipart_content_type())
        .set_payload(common::post_form_body("Orphaned", Some(999), None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(repo.count_posts().await.unwrap(), 0);
}

#[actix_web::test]
#[serial]
async fn signup_login_and_logout_roundtrip() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    let app = init_app!(&repo, &media);

    // Sign up sets a session cookie and redirects home.
    let req = test::TestRequest::post()
        .uri("/auth/signup/")
        .set_form([("username", "newcomer"), ("password", "long-enough-pw")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(common::location(&resp), "/");
    let cookies: Vec<_> = resp.response().cookies().collect();
    assert!(cookies.iter().any(|c| c.name() == "session"));

    repo.get_user_by_username("newcomer").await.unwrap();

    // Log in with the right password.
    let req = test::TestRequest::post()
        .uri("/auth/login/")
        .set_form([
            ("username", "newcomer"),
            ("password", "long-enough-pw"),
            ("next", "/create/"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(common::location(&resp), "/create/");

    // The wrong password re-renders the login form instead.
    let req = test::TestRequest::post()
        .uri("/auth/login/")
        .set_form([("username", "newcomer"), ("password", "wrong-password")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let html = common::body_string(resp).await;
    assert!(html.contains("Invalid username or password."));

    // Logout clears the cookie.
    let req = test::TestRequest::get().uri("/auth/logout/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(common::location(&resp), "/");
}

#[actix_web::test]
#[serial]
async fn duplicate_username_signup_is_rejected() {
    let media = common::setup_env();
    let repo = InMemRepo::new();
    repo.create_user(NewUser {
        username: "taken".into(),
        password_hash: "!".into(),
    })
    .await
    .unwrap();
    let app = init_app!(&repo, &media);

    let req = test::TestRequest::post()
        .uri("/auth/signup/")
        .set_form([("username", "taken"), ("password", "long-enough-pw")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let html = common::body_string(resp).await;
    assert!(html.contains("That username is taken."));
}
