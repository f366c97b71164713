use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use diet_engine::{ComposeError, PlanError};
use mongodb::{bson::doc, options::ClientOptions};
use serde::Serialize;

use crate::config::DbConfig;

use super::{data::StoreError, export::ExportError};

/// Connects and pings, so an unreachable server is noticed at startup
/// instead of on the first request.
pub async fn connect_db(cfg: &DbConfig) -> Option<mongodb::Database> {
    let options = match ClientOptions::parse(&cfg.url).await {
        Ok(v) => v,
        Err(err) => {
            tracing::error!("invalid db url {}: {err}", cfg.url);
            return None;
        },
    };

    let db = match mongodb::Client::with_options(options) {
        Ok(client) => client.database(&cfg.database),
        Err(err) => {
            tracing::error!("could not create db client: {err}");
            return None;
        },
    };

    match db.run_command(doc! { "ping": 1 }, None).await {
        Ok(_) => {
            tracing::info!("connected to db {}", cfg.database);
            Some(db)
        },
        Err(err) => {
            tracing::error!("could not reach db at {}: {err}", cfg.url);
            None
        },
    }
}

/// Escapes user input so it matches literally inside a regex.
pub fn search_pattern(search: &str) -> String {
    regex::escape(search.trim())
}

/// `axum::Json` with rejections reported as [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Store(StoreError::NotFound { .. }) =>
                (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Store(StoreError::InvalidFood(_) | StoreError::InvalidPatient(_)) =>
                (StatusCode::BAD_REQUEST, "invalid_input"),
            ApiError::Store(StoreError::Mongo(_) | StoreError::Counter(_)) =>
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ApiError::Plan(PlanError::Compose(ComposeError::NotSubstitutable { .. })) =>
                (StatusCode::UNPROCESSABLE_ENTITY, "not_substitutable"),
            ApiError::Plan(_) =>
                (StatusCode::NOT_FOUND, "item_not_found"),
            ApiError::Export(ExportError::NotConfigured) =>
                (StatusCode::SERVICE_UNAVAILABLE, "export_unavailable"),
            ApiError::Export(ExportError::Reqwest(_)) =>
                (StatusCode::BAD_GATEWAY, "export_failed"),
            ApiError::BadRequest(_) =>
                (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(value: PathRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        if status.is_server_error() {
            tracing::error!("{error}: {self}");
        }

        (status, axum::Json(ErrorBody { error, message: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_is_literal() {
        assert_eq!(search_pattern(" latte (intero) "), r"latte \(intero\)");
        assert_eq!(search_pattern("a.b*"), r"a\.b\*");
        assert_eq!(search_pattern("[x]+"), r"\[x\]\+");
    }

    #[test]
    fn errors_map_to_status() {
        let err = ApiError::from(PlanError::from(ComposeError::NotSubstitutable { food_id: 1 }));
        assert_eq!(err.status().0, StatusCode::UNPROCESSABLE_ENTITY);
        let err = ApiError::from(StoreError::NotFound { kind: "food", id: 3 });
        assert_eq!(err.status().0, StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "food 3 not found");
        let err = ApiError::from(ExportError::NotConfigured);
        assert_eq!(err.status().0, StatusCode::SERVICE_UNAVAILABLE);
    }
}
