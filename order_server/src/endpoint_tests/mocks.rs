use chrono::{DateTime, Utc};
use mockall::mock;
use order_engine::{
    db_types::{InventoryAlert, NewProduct, OrderStatusType, Product, ProductId},
    traits::{
        CatalogManagement,
        DailyTotal,
        InventoryAdjustment,
        OrderFlowError,
        ReportingManagement,
        StatusTotal,
    },
};

mock! {
    pub ReportingManager {}
    impl ReportingManagement for ReportingManager {
        async fn fetch_status_totals(&self) -> Result<Vec<StatusTotal>, OrderFlowError>;
        async fn fetch_daily_totals(&self, since: DateTime<Utc>, revenue_statuses: &[OrderStatusType]) -> Result<Vec<DailyTotal>, OrderFlowError>;
    }
}

mock! {
    pub CatalogManager {}
    impl CatalogManagement for CatalogManager {
        async fn fetch_product(&self, product_id: ProductId) -> Result<Option<Product>, OrderFlowError>;
        async fn insert_product(&self, product: NewProduct) -> Result<Product, OrderFlowError>;
        async fn decrement_inventory(&self, product_id: ProductId, quantity: i64) -> Result<InventoryAdjustment, OrderFlowError>;
        async fn fetch_inventory_alerts(&self) -> Result<Vec<InventoryAlert>, OrderFlowError>;
    }
}
