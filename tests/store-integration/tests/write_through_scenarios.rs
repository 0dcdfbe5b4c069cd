use mercado_client::checkout::Checkout;
use mercado_client::remote::rows::is_remote_id;
use mercado_client::{MemoryBackend, StoreError};
use mercado_common::currency::Money;
use mercado_common::order::{DeliveryMethod, OrderStatus, PaymentMethod};
use mercado_common::product::{Category, Product, ProductId, ProductPatch};
use mercado_common::ids::time_token;
use mercado_store_integration::{local, product_row, Harness};

/// Place a pickup order for one unit of the first product.
fn place_order(h: &mut Harness, payment: PaymentMethod) -> mercado_common::order::OrderId {
    let product = h.store.products()[0].clone();
    assert!(h.store.add_to_cart(&product));
    let channel = h
        .store
        .active_payment_channels()
        .into_iter()
        .find(|p| p.method == payment)
        .map(|p| p.id.clone())
        .unwrap();
    let mut checkout = Checkout::new(&h.store);
    let form = checkout.form_mut();
    form.customer_name = "Ana".into();
    form.customer_phone = "5351234567".into();
    form.delivery_method = DeliveryMethod::Pickup;
    form.payment_channel = Some(channel);
    for _ in 0..3 {
        checkout.advance(&h.store).unwrap();
    }
    checkout.confirm(&mut h.store).unwrap().order_id
}

#[tokio::test]
async fn created_product_gets_remote_id_and_edits_follow_it() {
    local(async {
        let mut h = Harness::online(MemoryBackend::new());
        h.startup().await;
        let local_id = ProductId(time_token());
        h.store.add_product(Product::new(
            local_id.clone(),
            "Café Serrano",
            Category::Alimentos,
            Money::from_major(650),
            12,
        ));
        assert!(h.store.update_product(&local_id, ProductPatch::stock(7)));
        h.flush().await;

        let rows = h.backend().products();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stock, Some(7));
        let remote_id = rows[0].id.clone().unwrap();
        assert!(is_remote_id(&remote_id));

        assert!(h.store.product(&local_id).is_none());
        let reconciled = h.store.product(&ProductId(remote_id)).unwrap();
        assert_eq!(reconciled.stock, 7);
    })
    .await;
}

#[tokio::test]
async fn failed_product_insert_keeps_local_copy() {
    local(async {
        let backend = MemoryBackend::new();
        backend.fail("create_product");
        let mut h = Harness::online(backend);
        h.startup().await;
        let before = h.store.products().len();
        let id = ProductId(time_token());
        h.store.add_product(Product::new(id.clone(), "Malta", Category::Refrescos, Money::from_major(180), 24));
        h.flush().await;
        assert_eq!(h.store.products().len(), before + 1);
        assert!(h.store.product(&id).is_some());
        assert!(h.backend().products().is_empty());
    })
    .await;
}

#[tokio::test]
async fn placed_order_is_stored_with_items_and_reconciled() {
    local(async {
        let backend = MemoryBackend::new().with_products(vec![product_row("Arroz", 250.0, 10)]);
        let mut h = Harness::online(backend);
        h.startup().await;
        let local_id = place_order(&mut h, PaymentMethod::Transfermovil);
        assert!(h.store.cart().is_empty());
        h.flush().await;

        let orders = h.backend().orders();
        assert_eq!(orders.len(), 1);
        let remote = &orders[0];
        assert_eq!(remote.total_cup, Some(250.0));
        assert_eq!(remote.payment_verified, Some(false));
        // No remote account: the local session id is not a valid customer key.
        assert_eq!(remote.customer_id, None);

        let items = h.backend().order_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].order_id.as_deref(), Some(remote.id.as_str()));
        assert!(items[0].product_id.as_deref().is_some_and(is_remote_id));

        assert!(h.store.order(&local_id).is_none());
        let order = &h.store.orders()[0];
        assert_eq!(order.id.0, remote.id);
        assert_eq!(order.order_number.0, remote.order_number);
    })
    .await;
}

#[tokio::test]
async fn order_survives_failed_item_insert() {
    local(async {
        let backend = MemoryBackend::new().with_products(vec![product_row("Arroz", 250.0, 10)]);
        backend.fail("create_order_items");
        let mut h = Harness::online(backend);
        h.startup().await;
        place_order(&mut h, PaymentMethod::Cash);
        h.flush().await;

        assert_eq!(h.backend().orders().len(), 1);
        assert!(h.backend().order_items().is_empty());
        assert_eq!(h.store.orders().len(), 1);
        assert!(is_remote_id(&h.store.orders()[0].id.0));
    })
    .await;
}

#[tokio::test]
async fn failed_order_insert_keeps_local_order() {
    local(async {
        let backend = MemoryBackend::new().with_products(vec![product_row("Arroz", 250.0, 10)]);
        backend.fail("create_order");
        let mut h = Harness::online(backend);
        h.startup().await;
        let id = place_order(&mut h, PaymentMethod::Cash);
        h.flush().await;
        assert!(h.backend().orders().is_empty());
        assert!(h.store.order(&id).is_some());
    })
    .await;
}

#[tokio::test]
async fn status_changes_reach_the_remote_order() {
    local(async {
        let backend = MemoryBackend::new().with_products(vec![product_row("Arroz", 250.0, 10)]);
        let mut h = Harness::online(backend);
        h.startup().await;
        place_order(&mut h, PaymentMethod::Enzona);
        h.settle().await;
        let id = h.store.orders()[0].id.clone();
        assert!(is_remote_id(&id.0));

        assert_eq!(h.store.advance_order(&id).unwrap(), OrderStatus::Confirmed);
        assert!(matches!(
            h.store.update_order_status(&id, OrderStatus::Delivered),
            Err(StoreError::IllegalTransition(_))
        ));
        assert_eq!(h.store.advance_order(&id).unwrap(), OrderStatus::Preparing);
        h.flush().await;

        assert_eq!(h.backend().call_count("update_order_status"), 2);
        assert_eq!(h.backend().orders()[0].status.as_deref(), Some("preparing"));
    })
    .await;
}

#[tokio::test]
async fn verifying_twice_writes_once() {
    local(async {
        let backend = MemoryBackend::new().with_products(vec![product_row("Arroz", 250.0, 10)]);
        let mut h = Harness::online(backend);
        h.startup().await;
        let id = place_order(&mut h, PaymentMethod::Transfer);
        assert!(h.store.verify_payment(&id).unwrap());
        assert!(!h.store.verify_payment(&id).unwrap());
        h.flush().await;

        assert_eq!(h.backend().call_count("verify_payment"), 1);
        assert_eq!(h.backend().orders()[0].payment_verified, Some(true));
        assert!(h.store.orders()[0].payment_verified);
    })
    .await;
}

#[tokio::test]
async fn cash_orders_need_no_verification() {
    local(async {
        let mut h = Harness::offline();
        let id = place_order(&mut h, PaymentMethod::Cash);
        assert!(h.store.order(&id).unwrap().payment_verified);
        assert!(!h.store.verify_payment(&id).unwrap());
    })
    .await;
}
