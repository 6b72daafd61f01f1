use axum::{
    Json,
    extract::{Path, Query},
};
use axum_extra::extract::WithRejection;

use crate::HubError;

pub mod browse;
pub mod connections;
pub mod permissions;

/// Extractors whose rejections render as [`HubError`].
pub type JsonBody<T> = WithRejection<Json<T>, HubError>;
pub type PathParams<T> = WithRejection<Path<T>, HubError>;
pub type QueryParams<T> = WithRejection<Query<T>, HubError>;
