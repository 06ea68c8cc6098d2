use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use order_engine::{
    db_types::{InventoryAlert, Money, OrderId, OrderStatusType, Principal, Product, ProductId},
    report_objects::OrderStats,
    traits::StatusTotal,
    CatalogApi,
    ReportingApi,
};
use serde_json::json;

use super::{
    helpers::{get_request, issue_token, post_request},
    mocks::{MockCatalogManager, MockReportingManager},
};
use crate::routes::{CreateProductRoute, InventoryAlertsRoute, OrderStatsRoute};

#[actix_web::test]
async fn order_stats() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(Principal::admin(1));
    let (status, body) = get_request(&token, "/admin/stats", configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let stats: OrderStats = serde_json::from_str(&body).unwrap();
    assert_eq!(stats.total_orders, 6);
    // pending orders are not revenue; refunded orders are
    assert_eq!(stats.total_revenue, Money::from(9000));
    assert_eq!(stats.by_status.len(), 3);
    assert_eq!(stats.daily.len(), 7);
    assert!(stats.daily.iter().all(|d| d.count == 0));
}

#[actix_web::test]
async fn inventory_alerts() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(Principal::admin(1));
    let (status, body) = get_request(&token, "/admin/inventory/alerts", configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let alerts: Vec<InventoryAlert> = serde_json::from_str(&body).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].shortfall(), 3);
    assert_eq!(alerts[0].order_id, Some(OrderId(8)));
}

#[actix_web::test]
async fn create_product() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(Principal::admin(1));
    let body = json!({"name": "Mechanical keyboard", "price": 499900, "inventory": 10});
    let (status, body) = post_request(&token, "/admin/products", body, configure).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let product: Product = serde_json::from_str(&body).unwrap();
    assert_eq!(product.id, ProductId(42));
    assert_eq!(product.price, Money::from(499900));
}

#[actix_web::test]
async fn malformed_product() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(Principal::admin(1));
    let (status, body) = post_request(&token, "/admin/products", json!({"name": "No price"}), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with(r#"{"error":"Could not read request body"#), "{body}");
}

fn configure(cfg: &mut ServiceConfig) {
    let mut reports = MockReportingManager::new();
    reports.expect_fetch_status_totals().returning(|| {
        Ok(vec![
            StatusTotal { status: OrderStatusType::Pending, count: 2, amount: Money::from(3000) },
            StatusTotal { status: OrderStatusType::Paid, count: 3, amount: Money::from(7500) },
            StatusTotal { status: OrderStatusType::Refunded, count: 1, amount: Money::from(1500) },
        ])
    });
    reports.expect_fetch_daily_totals().returning(|_, _| Ok(vec![]));
    let mut catalog = MockCatalogManager::new();
    catalog.expect_fetch_inventory_alerts().returning(|| {
        Ok(vec![InventoryAlert {
            id: 1,
            product_id: ProductId(3),
            order_id: Some(OrderId(8)),
            requested: 5,
            available: 2,
            created_at: Utc::now(),
        }])
    });
    catalog.expect_insert_product().returning(|p| {
        Ok(Product {
            id: ProductId(42),
            name: p.name,
            price: p.price,
            inventory: p.inventory,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    });
    cfg.service(OrderStatsRoute::<MockReportingManager>::new())
        .service(InventoryAlertsRoute::<MockCatalogManager>::new())
        .service(CreateProductRoute::<MockCatalogManager>::new())
        .app_data(web::Data::new(ReportingApi::new(reports)))
        .app_data(web::Data::new(CatalogApi::new(catalog)));
}
