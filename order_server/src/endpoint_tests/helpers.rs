use actix_web::{
    body::MessageBody,
    http::{header::AUTHORIZATION, StatusCode},
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use chrono::Duration;
use log::debug;
use order_engine::db_types::Principal;

use crate::{
    auth::{JwtAuthority, TokenIssuer},
    config::AuthConfig,
    middleware::JwtMiddlewareFactory,
    server::json_config,
};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig::new("endpoint-test-secret-0123456789abcdef")
}

pub fn issue_token(principal: Principal) -> String {
    TokenIssuer::new(&get_auth_config()).issue_token(&principal, None).expect("Failed to sign token")
}

pub fn expired_token(principal: Principal) -> String {
    TokenIssuer::new(&get_auth_config())
        .issue_token(&principal, Some(Duration::seconds(-60)))
        .expect("Failed to sign token")
}

/// Sends the request through an app that authenticates every route, like the server's `/api` scope. Errors raised by
/// the middleware are turned into responses, so callers always get a status and a body.
pub async fn send_request(
    req: TestRequest,
    token: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = if token.is_empty() { req } else { req.insert_header((AUTHORIZATION, format!("Bearer {token}"))) };
    let authority = JwtAuthority::new(&get_auth_config());
    let app = App::new().app_data(json_config()).wrap(JwtMiddlewareFactory::new(authority)).configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
            (status, body)
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
            (status, body)
        },
    }
}

pub async fn get_request(
    token: &str,
    path: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    send_request(TestRequest::get().uri(path), token, configure).await
}

pub async fn post_request(
    token: &str,
    path: &str,
    body: serde_json::Value,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    send_request(TestRequest::post().uri(path).set_json(body), token, configure).await
}
