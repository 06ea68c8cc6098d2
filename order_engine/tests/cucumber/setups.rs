use cucumber::given;
use order_engine::db_types::{Money, NewProduct};

use crate::cucumber::{shop_world::ShopSystem, ShopWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut ShopWorld) {
    let system = ShopSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a product '{word}' priced at {int} with {int} in stock")]
async fn create_product(world: &mut ShopWorld, name: String, price: i64, inventory: i64) {
    let admin = world.admin();
    let product = world
        .system()
        .catalog
        .create_product(&admin, NewProduct::new(name.clone(), Money::from(price), inventory))
        .await
        .expect("Error creating product");
    world.products.insert(name, product.id);
}
