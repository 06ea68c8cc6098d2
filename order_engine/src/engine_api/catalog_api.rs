use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Capability, InventoryAlert, NewProduct, Principal, Product, ProductId},
    traits::{CatalogManagement, OrderFlowError},
};

/// The thin slice of catalog administration the order engine needs: seeding products and reviewing stock shortfalls.
pub struct CatalogApi<B> {
    db: B,
}

impl<B> Debug for CatalogApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CatalogApi")
    }
}

impl<B> CatalogApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CatalogApi<B>
where B: CatalogManagement
{
    pub async fn product(&self, product_id: ProductId) -> Result<Product, OrderFlowError> {
        self.db.fetch_product(product_id).await?.ok_or(OrderFlowError::ProductNotFound(product_id))
    }

    pub async fn create_product(&self, principal: &Principal, product: NewProduct) -> Result<Product, OrderFlowError> {
        principal.require(Capability::ManageCatalog)?;
        if product.name.trim().is_empty() {
            return Err(OrderFlowError::ValidationError("Product name cannot be empty".into()));
        }
        let product = self.db.insert_product(product).await?;
        info!("📦️ Admin {} created {} ({}) at {}", principal.user_id, product.id, product.name, product.price);
        Ok(product)
    }

    pub async fn inventory_alerts(&self, principal: &Principal) -> Result<Vec<InventoryAlert>, OrderFlowError> {
        principal.require(Capability::ManageCatalog)?;
        self.db.fetch_inventory_alerts().await
    }
}
