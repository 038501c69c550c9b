use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
}

#[async_trait]
pub trait GroupRepo: Send + Sync {
    async fn create_group(&self, new: NewGroup) -> RepoResult<Group>;
    async fn list_groups(&self) -> RepoResult<Vec<Group>>;
    async fn get_group(&self, id: Id) -> RepoResult<Group>;
    async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group>;
}

/// Feed listings are newest-first (descending id, which is creation order).
#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    /// Bulk insert; ids are assigned in input order.
    async fn create_posts(&self, new: Vec<NewPost>) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn list_posts(&self) -> RepoResult<Vec<Post>>;
    async fn list_posts_by_group(&self, group_id: Id) -> RepoResult<Vec<Post>>;
    async fn list_posts_by_author(&self, author_id: Id) -> RepoResult<Vec<Post>>;
    async fn count_posts(&self) -> RepoResult<usize>;
}

pub trait Repo: UserRepo + GroupRepo + PostRepo {}

impl<T> Repo for T where T: UserRepo + GroupRepo + PostRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    use chrono::Utc;

    use super::*;

    #[derive(Default)]
    struct State {
        users: HashMap<Id, User>,
        groups: HashMap<Id, Group>,
        posts: HashMap<Id, Post>,
        next_id: Id,
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn insert_post(state: &mut State, new: NewPost) -> RepoResult<Post> {
            if !state.users.contains_key(&new.author_id) {
                return Err(RepoError::NotFound);
            }
            if let Some(gid) = new.group_id {
                if !state.groups.contains_key(&gid) {
                    return Err(RepoError::NotFound);
                }
            }
            let id = Self::next_id(state);
            let post = Post {
                id,
                author_id: new.author_id,
                group_id: new.group_id,
                text: new.text,
                image: new.image,
                created_at: Utc::now(),
            };
            state.posts.insert(id, post.clone());
            Ok(post)
        }

        fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
            posts.sort_by(|a, b| b.id.cmp(&a.id));
            posts
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                password_hash: new.password_hash,
                joined_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl GroupRepo for InMemRepo {
        async fn create_group(&self, new: NewGroup) -> RepoResult<Group> {
            let mut s = self.state.write().unwrap();
            if s.groups.values().any(|g| g.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let group = Group {
                id,
                title: new.title,
                slug: new.slug,
                description: new.description,
                created_at: Utc::now(),
            };
            s.groups.insert(id, group.clone());
            Ok(group)
        }

        async fn list_groups(&self) -> RepoResult<Vec<Group>> {
            let s = self.state.read().unwrap();
            let mut groups: Vec<Group> = s.groups.values().cloned().collect();
            groups.sort_by_key(|g| g.id);
            Ok(groups)
        }

        async fn get_group(&self, id: Id) -> RepoResult<Group> {
            let s = self.state.read().unwrap();
            s.groups.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group> {
            let s = self.state.read().unwrap();
            s.groups
                .values()
                .find(|g| g.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            Self::insert_post(&mut s, new)
        }

        async fn create_posts(&self, new: Vec<NewPost>) -> RepoResult<Vec<Post>> {
            let mut s = self.state.write().unwrap();
            let mut created = Vec::with_capacity(new.len());
            for item in new {
                created.push(Self::insert_post(&mut s, item)?);
            }
            Ok(created)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if let Some(gid) = upd.group_id {
                if !s.groups.contains_key(&gid) {
                    return Err(RepoError::NotFound);
                }
            }
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.text = upd.text;
            post.group_id = upd.group_id;
            if let Some(image) = upd.image {
                post.image = Some(image);
            }
            Ok(post.clone())
        }

        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            Ok(Self::newest_first(s.posts.values().cloned().collect()))
        }

        async fn list_posts_by_group(&self, group_id: Id) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            Ok(Self::newest_first(
                s.posts
                    .values()
                    .filter(|p| p.group_id == Some(group_id))
                    .cloned()
                    .collect(),
            ))
        }

        async fn list_posts_by_author(&self, author_id: Id) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            Ok(Self::newest_first(
                s.posts
                    .values()
                    .filter(|p| p.author_id == author_id)
                    .cloned()
                    .collect(),
            ))
        }

        async fn count_posts(&self) -> RepoResult<usize> {
            let s = self.state.read().unwrap();
            Ok(s.posts.len())
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use sqlx::PgPool;

    use super::*;

    pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

    #[derive(Clone)]
    pub struct PgRepo {
        pool: PgPool,
    }

    impl PgRepo {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            // Dangling author/group references surface as foreign key errors.
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    const POST_COLUMNS: &str = "id, author_id, group_id, text, image, created_at";

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (username, password_hash) VALUES ($1, $2) \
                 RETURNING id, username, password_hash, joined_at",
            )
            .bind(new.username)
            .bind(new.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, password_hash, joined_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, password_hash, joined_at FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl GroupRepo for PgRepo {
        async fn create_group(&self, new: NewGroup) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>(
                "INSERT INTO post_groups (title, slug, description) VALUES ($1, $2, $3) \
                 RETURNING id, title, slug, description, created_at",
            )
            .bind(new.title)
            .bind(new.slug)
            .bind(new.description)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_groups(&self) -> RepoResult<Vec<Group>> {
            sqlx::query_as::<_, Group>(
                "SELECT id, title, slug, description, created_at FROM post_groups ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_group(&self, id: Id) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>(
                "SELECT id, title, slug, description, created_at FROM post_groups WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>(
                "SELECT id, title, slug, description, created_at FROM post_groups WHERE slug = $1",
            )
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (author_id, group_id, text, image) VALUES ($1, $2, $3, $4) \
                 RETURNING {POST_COLUMNS}"
            ))
            .bind(new.author_id)
            .bind(new.group_id)
            .bind(new.text)
            .bind(new.image)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn create_posts(&self, new: Vec<NewPost>) -> RepoResult<Vec<Post>> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let mut created = Vec::with_capacity(new.len());
            for item in new {
                let post = sqlx::query_as::<_, Post>(&format!(
                    "INSERT INTO posts (author_id, group_id, text, image) \
                     VALUES ($1, $2, $3, $4) RETURNING {POST_COLUMNS}"
                ))
                .bind(item.author_id)
                .bind(item.group_id)
                .bind(item.text)
                .bind(item.image)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_err)?;
                created.push(post);
            }
            tx.commit().await.map_err(map_err)?;
            Ok(created)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET text = $2, group_id = $3, image = COALESCE($4, image) \
                 WHERE id = $1 RETURNING {POST_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.text)
            .bind(upd.group_id)
            .bind(upd.image)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts ORDER BY id DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_posts_by_group(&self, group_id: Id) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE group_id = $1 ORDER BY id DESC"
            ))
            .bind(group_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_posts_by_author(&self, author_id: Id) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE author_id = $1 ORDER BY id DESC"
            ))
            .bind(author_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn count_posts(&self) -> RepoResult<usize> {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(n as usize)
        }
    }
}
