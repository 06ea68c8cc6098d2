use actix_web::{http::StatusCode, test, web, web::ServiceConfig, App};
use order_engine::{db_types::Principal, ReportingApi};

use super::{
    helpers::{expired_token, get_request, issue_token},
    mocks::MockReportingManager,
};
use crate::{
    auth::TokenIssuer,
    config::AuthConfig,
    routes::{health, OrderStatsRoute},
};

#[actix_web::test]
async fn health_needs_no_token() {
    let app = test::init_service(App::new().service(health)).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn missing_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("", "/admin/stats", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Authentication Error. No access token was provided."}"#);
}

#[actix_web::test]
async fn expired_token_is_rejected() {
    let _ = env_logger::try_init().ok();
    let token = expired_token(Principal::admin(1));
    let (status, body) = get_request(&token, "/admin/stats", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Authentication Error. Access token has expired."}"#);
}

#[actix_web::test]
async fn tampered_token_is_rejected() {
    let _ = env_logger::try_init().ok();
    let mut token = issue_token(Principal::admin(1));
    token.replace_range(token.len() - 10..token.len() - 5, "AAAAA");
    let (status, _) = get_request(&token, "/admin/stats", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let other = AuthConfig::new("a-completely-different-secret-for-tests");
    let token = TokenIssuer::new(&other).issue_token(&Principal::admin(1), None).unwrap();
    let (status, _) = get_request(&token, "/admin/stats", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn customers_cannot_use_admin_routes() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(Principal::customer(5));
    let (status, body) = get_request(&token, "/admin/stats", configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, r#"{"error":"Insufficient Permissions. customer is not permitted to access this resource"}"#);
}

#[actix_web::test]
async fn admins_can_use_admin_routes() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(Principal::admin(1));
    let (status, body) = get_request(&token, "/admin/stats", configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

fn configure(cfg: &mut ServiceConfig) {
    let mut reports = MockReportingManager::new();
    reports.expect_fetch_status_totals().returning(|| Ok(vec![]));
    reports.expect_fetch_daily_totals().returning(|_, _| Ok(vec![]));
    cfg.service(OrderStatsRoute::<MockReportingManager>::new()).app_data(web::Data::new(ReportingApi::new(reports)));
}
