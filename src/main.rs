use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use quill::routes::{config, AppState};
use quill::security::SecurityHeaders;
use quill::storage::FsImageStore;

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use quill::repo::inmem::InMemRepo;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup
    // overhead; production environments set variables externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping quill server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = {
        info!("Using in-memory repository backend");
        InMemRepo::new()
    };

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        quill::repo::pg::MIGRATOR
            .run(&pool)
            .await
            .expect("Failed to run database migrations");
        info!("Using Postgres repository backend");
        quill::repo::pg::PgRepo::new(pool)
    };

    let image_store = FsImageStore::from_env().expect("Failed to prepare media directory");
    let state = AppState {
        repo: Arc::new(repo),
        image_store: Arc::new(image_store),
    };

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .app_data(web::Data::new(state.clone()))
            .configure(config)
    })
    .bind(("0.0.0.0", 8000))?;

    info!("Listening on http://0.0.0.0:8000");

    server.run().await
}

/// Validate required environment variables before serving traffic.
fn validate_env_vars() {
    match std::env::var("SESSION_SECRET") {
        Ok(secret) if secret.len() >= 32 => {}
        Ok(_) => {
            eprintln!("SESSION_SECRET must be at least 32 characters long");
            std::process::exit(1);
        }
        Err(_) => {
            eprintln!("Missing required environment variable SESSION_SECRET");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    }
}
