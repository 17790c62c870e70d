use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::HeaderMap,
    response::IntoResponse,
};

use super::model::{EchoResponse, ProtectedResponse, RootResponse};
use crate::error::AppError;
use crate::middleware::{Identity, client_ip};
use crate::utils::success_to_api_response;

pub async fn root(Extension(identity): Extension<Identity>, req: Request) -> impl IntoResponse {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    success_to_api_response(RootResponse {
        message: "Rate limiter running".to_string(),
        ip: client_ip(req.headers(), peer),
        token: identity.token().map(str::to_string),
    })
}

/// Load-test target that echoes the request headers.
pub async fn echo_headers(headers: HeaderMap) -> impl IntoResponse {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    success_to_api_response(EchoResponse {
        message: "Load test".to_string(),
        headers,
    })
}

pub async fn protected(
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, AppError> {
    let token = identity.token().ok_or(AppError::Unauthorized)?;
    Ok(success_to_api_response(ProtectedResponse {
        message: "Access granted".to_string(),
        token: token.to_string(),
    }))
}
