//! Error types shared by the registry, the stores and the HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::model::{Link, LinkId};

/// Failures of the persistence substrate
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write would break the unique url or list name constraint
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! redb_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(err: $ty) -> Self {
                    StoreError::Redb(err.into())
                }
            }
        )*
    };
}

redb_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Errors surfaced by registry operations
#[derive(Debug, Error)]
pub enum GoError {
    /// Keyword failed sanitization
    #[error("keyword '{0}' not sanitary")]
    InvalidKeyword(String),

    /// A URL template refers to a capture group the match did not produce
    #[error("no value for placeholder {{{0}}}")]
    MissingTemplateArgument(String),

    /// Another link already uses this URL
    #[error("found identical existing URL (link {})", .0.id)]
    UrlConflict(Box<Link>),

    /// Another list already uses this name
    #[error("list '{0}' already exists")]
    ListConflict(String),

    #[error("link {0} does not exist")]
    LinkNotFound(LinkId),

    #[error("list '{0}' does not exist")]
    ListNotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GoError {
    /// Machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            GoError::InvalidKeyword(_) => "invalid_keyword",
            GoError::MissingTemplateArgument(_) => "missing_argument",
            GoError::UrlConflict(_) | GoError::ListConflict(_) => "conflict",
            GoError::LinkNotFound(_) | GoError::ListNotFound(_) => "not_found",
            GoError::InvalidInput(_) => "invalid_input",
            GoError::Store(_) => "storage",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GoError::InvalidKeyword(_)
            | GoError::MissingTemplateArgument(_)
            | GoError::LinkNotFound(_)
            | GoError::ListNotFound(_) => StatusCode::NOT_FOUND,
            GoError::UrlConflict(_) | GoError::ListConflict(_) => StatusCode::CONFLICT,
            GoError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GoError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GoError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        if let GoError::UrlConflict(existing) = &self {
            body["existing"] = json!(existing);
        }
        if let GoError::Store(err) = &self {
            tracing::error!("storage failure: {}", err);
        }

        (self.status(), Json(body)).into_response()
    }
}
