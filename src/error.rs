use actix_web::{http::StatusCode, HttpResponse, ResponseError};

use crate::repo::RepoError;

#[derive(thiserror::Error, Debug)]
pub enum PageError {
    #[error("not found")]
    NotFound,
    #[error("bad request")]
    BadRequest,
    #[error("internal error")]
    Internal,
}

impl From<RepoError> for PageError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => PageError::NotFound,
            RepoError::Conflict => PageError::BadRequest,
            RepoError::Internal(msg) => {
                tracing::error!("repository error: {msg}");
                PageError::Internal
            }
        }
    }
}

impl From<rinja::Error> for PageError {
    fn from(e: rinja::Error) -> Self {
        tracing::error!("template rendering failed: {e}");
        PageError::Internal
    }
}

impl ResponseError for PageError {
    fn status_code(&self) -> StatusCode {
        match self {
            PageError::NotFound => StatusCode::NOT_FOUND,
            PageError::BadRequest => StatusCode::BAD_REQUEST,
            PageError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            PageError::NotFound => "<!DOCTYPE html><title>404</title><h1>404 Not Found</h1>",
            PageError::BadRequest => "<!DOCTYPE html><title>400</title><h1>400 Bad Request</h1>",
            PageError::Internal => {
                "<!DOCTYPE html><title>500</title><h1>500 Internal Server Error</h1>"
            }
        };
        HttpResponse::build(self.status_code())
            .content_type("text/html; charset=utf-8")
            .body(body)
    }
}
