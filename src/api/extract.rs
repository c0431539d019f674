//! Extractors whose rejections render as `AppError` JSON bodies.

use crate::error::AppError;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path,
    },
    http::request::Parts,
};
use uuid::Uuid;

/// `{id}` path segment naming a deal. Anything that is not a UUID cannot
/// name a deal, so it is reported as not found.
#[derive(Debug, Clone, Copy)]
pub struct DealId(pub Uuid);

impl<S> FromRequestParts<S> for DealId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| deal_not_found())?;
        Uuid::parse_str(&raw).map(DealId).map_err(|_| deal_not_found())
    }
}

fn deal_not_found() -> AppError {
    AppError::NotFound("Deal not found".to_string())
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
