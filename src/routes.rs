use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::auth::{self, Auth};
use crate::error::PageError;
use crate::models::*;
use crate::pagination::{paginate, POSTS_PER_PAGE};
use crate::repo::{Repo, RepoError};
use crate::storage::{ImageStore, ImageStoreError};
use crate::view::{self, render};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/group/{slug}/").route(web::get().to(group_posts)))
        .service(web::resource("/profile/{username}/").route(web::get().to(profile)))
        .service(
            web::resource("/create/")
                .route(web::get().to(post_create_page))
                .route(web::post().to(post_create)),
        )
        .service(web::resource("/posts/{id}/").route(web::get().to(post_detail)))
        .service(
            web::resource("/posts/{id}/edit/")
                .route(web::get().to(post_edit_page))
                .route(web::post().to(post_edit)),
        )
        .service(web::resource("/media/{filename}").route(web::get().to(media)))
        .service(
            web::resource("/auth/signup/")
                .route(web::get().to(signup_page))
                .route(web::post().to(signup)),
        )
        .service(
            web::resource("/auth/login/")
                .route(web::get().to(login_page))
                .route(web::post().to(login)),
        )
        .service(web::resource("/auth/logout/").route(web::get().to(logout)))
        .default_service(web::route().to(not_found));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<usize>,
}

pub async fn not_found() -> Result<HttpResponse, PageError> {
    Err(PageError::NotFound)
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn login_redirect(next: &str) -> HttpResponse {
    redirect(format!("/auth/login/?next={next}"))
}

// ---------------- feed pages -------------------------------------------------

async fn post_card(repo: &dyn Repo, post: Post) -> Result<view::PostCard, PageError> {
    let author = repo.get_user(post.author_id).await?;
    let group = match post.group_id {
        Some(gid) => Some(repo.get_group(gid).await?),
        None => None,
    };
    Ok(view::PostCard {
        id: post.id,
        author: author.username,
        group: group.map(|g| view::GroupRef {
            title: g.title,
            slug: g.slug,
        }),
        text: post.text,
        image: post.image,
        created_at: post.created_at,
    })
}

async fn post_cards(repo: &dyn Repo, posts: Vec<Post>) -> Result<Vec<view::PostCard>, PageError> {
    let mut cards = Vec::with_capacity(posts.len());
    for post in posts {
        cards.push(post_card(repo, post).await?);
    }
    Ok(cards)
}

pub async fn index(
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, PageError> {
    let posts = data.repo.list_posts().await?;
    let cards = post_cards(&*data.repo, posts).await?;
    let page = paginate(cards, query.page.unwrap_or(1), POSTS_PER_PAGE);
    render(&view::IndexPage { page })
}

pub async fn group_posts(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, PageError> {
    let slug = path.into_inner();
    let group = data.repo.get_group_by_slug(&slug).await?;
    let posts = data.repo.list_posts_by_group(group.id).await?;
    let cards = post_cards(&*data.repo, posts).await?;
    let page = paginate(cards, query.page.unwrap_or(1), POSTS_PER_PAGE);
    render(&view::GroupListPage { group, page })
}

pub async fn profile(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, PageError> {
    let username = path.into_inner();
    let author = data.repo.get_user_by_username(&username).await?;
    let posts = data.repo.list_posts_by_author(author.id).await?;
    let total = posts.len();
    let cards = post_cards(&*data.repo, posts).await?;
    let page = paginate(cards, query.page.unwrap_or(1), POSTS_PER_PAGE);
    render(&view::ProfilePage {
        author,
        total,
        page,
    })
}

pub async fn post_detail(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, PageError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let author_posts = data.repo.list_posts_by_author(post.author_id).await?.len();
    let post = post_card(&*data.repo, post).await?;
    render(&view::PostDetailPage { post, author_posts })
}

// ---------------- create / edit ----------------------------------------------

const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const TEXT_REQUIRED: &str = "This field is required.";

#[derive(Debug, Default)]
struct PostFormData {
    text: String,
    group: Option<Id>,
    image: Option<Vec<u8>>,
}

/// Read the multipart post form: `text`, optional `group` id, optional
/// `image` file. Unknown fields are ignored.
async fn read_post_form(mut payload: Multipart) -> Result<PostFormData, PageError> {
    let mut form = PostFormData::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        PageError::BadRequest
    })? {
        let name = match field.content_disposition().get_name() {
            Some(n) => n.to_owned(),
            None => continue,
        };
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("multipart stream read error: {e}");
            PageError::BadRequest
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Err(PageError::BadRequest);
            }
            bytes.extend_from_slice(&chunk);
        }
        match name.as_str() {
            "text" => {
                form.text = String::from_utf8(bytes).map_err(|_| PageError::BadRequest)?;
            }
            "group" => {
                let raw = String::from_utf8(bytes).map_err(|_| PageError::BadRequest)?;
                let raw = raw.trim().to_owned();
                if !raw.is_empty() {
                    form.group = Some(raw.parse().map_err(|_| PageError::BadRequest)?);
                }
            }
            "image" => {
                // Browsers submit an empty part when no file was chosen.
                if !bytes.is_empty() {
                    form.image = Some(bytes);
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Persist an uploaded image under its content hash. Returns the stored
/// filename; duplicate uploads are idempotent.
async fn store_image(store: &dyn ImageStore, bytes: &[u8]) -> Result<String, PageError> {
    let mime = infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    // The match doubles as the upload whitelist.
    let ext = match mime.as_str() {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => return Err(PageError::BadRequest),
    };

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash = format!("{:x}", hasher.finalize());
    let filename = format!("{hash}.{ext}");

    match store.save(&filename, bytes).await {
        Ok(()) | Err(ImageStoreError::Duplicate) => Ok(filename),
        Err(e) => {
            log::error!("image store save error: {e}");
            Err(PageError::Internal)
        }
    }
}

pub async fn post_create_page(
    auth: Option<Auth>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PageError> {
    if auth.is_none() {
        return Ok(login_redirect("/create/"));
    }
    let groups = data.repo.list_groups().await?;
    render(&view::PostFormPage::create(groups, String::new(), None))
}

pub async fn post_create(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, PageError> {
    let Some(Auth(claims)) = auth else {
        return Ok(login_redirect("/create/"));
    };
    let form = read_post_form(payload).await?;

    if form.text.trim().is_empty() {
        let groups = data.repo.list_groups().await?;
        let page =
            view::PostFormPage::create(groups, form.text, form.group).with_error(TEXT_REQUIRED);
        return render(&page);
    }
    if let Some(gid) = form.group {
        data.repo.get_group(gid).await?;
    }
    let image = match &form.image {
        Some(bytes) => Some(store_image(&*data.image_store, bytes).await?),
        None => None,
    };

    data.repo
        .create_post(NewPost {
            author_id: claims.sub,
            group_id: form.group,
            text: form.text,
            image,
        })
        .await?;

    Ok(redirect(format!("/profile/{}/", claims.username)))
}

/// Loads the post for an edit request, enforcing that only the author may
/// touch it. Anyone else sees a 404, not a hint that the post exists.
async fn editable_post(repo: &dyn Repo, id: Id, claims: &auth::Claims) -> Result<Post, PageError> {
    let post = repo.get_post(id).await?;
    if post.author_id != claims.sub {
        return Err(PageError::NotFound);
    }
    Ok(post)
}

pub async fn post_edit_page(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, PageError> {
    let id = path.into_inner();
    let Some(Auth(claims)) = auth else {
        return Ok(login_redirect(&format!("/posts/{id}/edit/")));
    };
    let post = editable_post(&*data.repo, id, &claims).await?;
    let groups = data.repo.list_groups().await?;
    render(&view::PostFormPage::edit(
        post.id,
        groups,
        post.text,
        post.group_id,
    ))
}

pub async fn post_edit(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, PageError> {
    let id = path.into_inner();
    let Some(Auth(claims)) = auth else {
        return Ok(login_redirect(&format!("/posts/{id}/edit/")));
    };
    let post = editable_post(&*data.repo, id, &claims).await?;
    let form = read_post_form(payload).await?;

    if form.text.trim().is_empty() {
        let groups = data.repo.list_groups().await?;
        let page =
            view::PostFormPage::edit(id, groups, form.text, form.group).with_error(TEXT_REQUIRED);
        return render(&page);
    }
    if let Some(gid) = form.group {
        data.repo.get_group(gid).await?;
    }
    let image = match &form.image {
        Some(bytes) => Some(store_image(&*data.image_store, bytes).await?),
        None => None,
    };

    data.repo
        .update_post(
            id,
            UpdatePost {
                text: form.text,
                group_id: form.group,
                image: image.clone(),
            },
        )
        .await?;

    // The old file is unreferenced once replaced.
    if let (Some(new), Some(old)) = (image, post.image) {
        if new != old {
            let _ = data.image_store.delete(&old).await;
        }
    }

    Ok(redirect(format!("/posts/{id}/")))
}

// ---------------- media ------------------------------------------------------

pub async fn media(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, PageError> {
    let name = path.into_inner();
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(PageError::NotFound);
    }
    let (bytes, mime) = data
        .image_store
        .load(&name)
        .await
        .map_err(|_| PageError::NotFound)?;
    Ok(HttpResponse::Ok().content_type(mime).body(bytes))
}

// ---------------- auth pages -------------------------------------------------

const BAD_CREDENTIALS: &str = "Invalid username or password.";

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
    #[serde(default)]
    next: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    next: String,
}

fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 40
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Only same-site paths are allowed as post-login targets.
fn safe_next(next: &str) -> Option<&str> {
    if next.starts_with('/') && !next.starts_with("//") {
        Some(next)
    } else {
        None
    }
}

pub async fn signup_page() -> Result<HttpResponse, PageError> {
    render(&view::SignupPage {
        username: String::new(),
        error: None,
    })
}

pub async fn signup(
    data: web::Data<AppState>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse, PageError> {
    let form = form.into_inner();
    let username = form.username.trim().to_owned();
    if !valid_username(&username) {
        return render(&view::SignupPage {
            username,
            error: Some("Usernames may contain letters, digits, '_', '-' and '.'.".into()),
        });
    }
    if form.password.len() < 8 {
        return render(&view::SignupPage {
            username,
            error: Some("Password must be at least 8 characters.".into()),
        });
    }

    let password_hash = password_auth::generate_hash(form.password.as_bytes());
    match data
        .repo
        .create_user(NewUser {
            username: username.clone(),
            password_hash,
        })
        .await
    {
        Ok(user) => {
            let token = auth::create_session_jwt(user.id, &user.username)
                .map_err(|_| PageError::Internal)?;
            Ok(HttpResponse::Found()
                .cookie(auth::session_cookie(token))
                .insert_header((header::LOCATION, "/"))
                .finish())
        }
        Err(RepoError::Conflict) => render(&view::SignupPage {
            username,
            error: Some("That username is taken.".into()),
        }),
        Err(e) => Err(e.into()),
    }
}

pub async fn login_page(query: web::Query<LoginQuery>) -> Result<HttpResponse, PageError> {
    render(&view::LoginPage {
        username: String::new(),
        next: query.into_inner().next,
        error: None,
    })
}

pub async fn login(
    data: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, PageError> {
    let form = form.into_inner();
    let failed = || {
        render(&view::LoginPage {
            username: form.username.clone(),
            next: form.next.clone(),
            error: Some(BAD_CREDENTIALS.into()),
        })
    };

    let user = match data.repo.get_user_by_username(&form.username).await {
        Ok(user) => user,
        Err(RepoError::NotFound) => return failed(),
        Err(e) => return Err(e.into()),
    };
    if password_auth::verify_password(form.password.as_bytes(), &user.password_hash).is_err() {
        return failed();
    }

    let token =
        auth::create_session_jwt(user.id, &user.username).map_err(|_| PageError::Internal)?;
    let location = safe_next(&form.next).unwrap_or("/").to_owned();
    Ok(HttpResponse::Found()
        .cookie(auth::session_cookie(token))
        .insert_header((header::LOCATION, location))
        .finish())
}

pub async fn logout() -> HttpResponse {
    HttpResponse::Found()
        .cookie(auth::clear_session_cookie())
        .insert_header((header::LOCATION, "/"))
        .finish()
}
