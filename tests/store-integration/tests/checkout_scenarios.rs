use mercado_client::checkout::{Checkout, CheckoutError, CheckoutStep};
use mercado_client::{MemoryBackend, PullOrigin, StoreError, StoreEvent, StoreOptions};
use mercado_client::local::LocalPersistence;
use mercado_common::currency::{Currency, Money};
use mercado_common::order::{
    DeliveryMethod, Order, OrderDraft, OrderId, OrderNumber, OrderStatus, PaymentMethod,
};
use mercado_common::product::ProductId;
use mercado_store_integration::{local, product_row, zone_row, Harness};

fn catalog() -> MemoryBackend {
    MemoryBackend::new()
        .with_products(vec![
            product_row("Arroz", 250.0, 3),
            product_row("Aceite", 2500.0, 10),
        ])
        .with_zones(vec![zone_row("z-centro", "Centro", 150.0)])
}

fn by_name(h: &Harness, name: &str) -> ProductId {
    h.store
        .products()
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.id.clone())
        .unwrap()
}

fn customer(checkout: &mut Checkout, method: DeliveryMethod) {
    let form = checkout.form_mut();
    form.customer_name = "Ana".into();
    form.customer_phone = "5351234567".into();
    form.customer_address = "Calle Martí 12".into();
    form.delivery_method = method;
    form.zone_id = Some("z-centro".into());
}

#[tokio::test]
async fn cart_is_capped_at_stock() {
    local(async {
        let mut h = Harness::online(catalog());
        h.startup().await;
        let arroz = h.store.product(&by_name(&h, "Arroz")).cloned().unwrap();
        for _ in 0..5 {
            h.store.add_to_cart(&arroz);
        }
        assert_eq!(h.store.cart_count(), 3);
        assert!(!h.store.add_to_cart(&arroz));
    })
    .await;
}

#[tokio::test]
async fn delivery_fee_rules() {
    local(async {
        let mut h = Harness::online(catalog());
        h.startup().await;
        let arroz = h.store.product(&by_name(&h, "Arroz")).cloned().unwrap();
        h.store.add_to_cart(&arroz);

        let mut checkout = Checkout::new(&h.store);
        customer(&mut checkout, DeliveryMethod::Delivery);
        let quote = checkout.quote(&h.store);
        assert_eq!(quote.subtotal, Money::from_major(250));
        assert_eq!(quote.delivery_fee, Money::from_major(150));
        assert_eq!(quote.total, quote.subtotal + quote.delivery_fee);

        checkout.form_mut().delivery_method = DeliveryMethod::Pickup;
        assert_eq!(checkout.quote(&h.store).delivery_fee, Money::ZERO);

        // 2 x 2500 reaches the free-delivery threshold exactly.
        h.store.clear_cart();
        let aceite = h.store.product(&by_name(&h, "Aceite")).cloned().unwrap();
        h.store.add_to_cart(&aceite);
        h.store.add_to_cart(&aceite);
        checkout.form_mut().delivery_method = DeliveryMethod::Messenger;
        let quote = checkout.quote(&h.store);
        assert_eq!(quote.subtotal, Currency::Cup.free_delivery_threshold());
        assert!(quote.is_free_delivery());
        assert_eq!(quote.total, quote.subtotal);
    })
    .await;
}

#[tokio::test]
async fn wizard_walks_all_steps_and_places_order() {
    local(async {
        let mut h = Harness::online(catalog());
        h.startup().await;
        let arroz = h.store.product(&by_name(&h, "Arroz")).cloned().unwrap();
        h.store.add_to_cart(&arroz);
        h.store.add_to_cart(&arroz);

        let mut checkout = Checkout::new(&h.store);
        assert!(matches!(checkout.advance(&h.store), Err(CheckoutError::MissingName)));
        customer(&mut checkout, DeliveryMethod::Delivery);
        checkout.form_mut().zone_id = None;
        assert_eq!(checkout.advance(&h.store).unwrap(), CheckoutStep::Delivery);
        assert!(matches!(checkout.advance(&h.store), Err(CheckoutError::MissingZone)));
        checkout.form_mut().zone_id = Some("z-centro".into());
        assert_eq!(checkout.advance(&h.store).unwrap(), CheckoutStep::Payment);
        assert_eq!(checkout.advance(&h.store).unwrap(), CheckoutStep::Review);

        let confirmation = checkout.confirm(&mut h.store).unwrap();
        assert_eq!(confirmation.total, Money::from_major(650));
        assert!(confirmation.transfer_to.is_some());
        assert!(h.store.cart().is_empty());
        h.flush().await;

        let remote = &h.backend().orders()[0];
        assert_eq!(remote.order_number, confirmation.order_number.0);
        assert_eq!(remote.subtotal_cup, Some(500.0));
        assert_eq!(remote.delivery_fee_cup, Some(150.0));
        assert_eq!(remote.total_cup, Some(650.0));
        assert_eq!(h.backend().order_items()[0].quantity, 2);
    })
    .await;
}

#[tokio::test]
async fn reserved_stock_is_taken_and_returned() {
    local(async {
        let options = StoreOptions {
            reserve_stock: true,
            ..StoreOptions::default()
        };
        let mut h = Harness::build(options, LocalPersistence::in_memory(), Some(catalog()));
        h.startup().await;
        let id = by_name(&h, "Arroz");
        let arroz = h.store.product(&id).cloned().unwrap();
        for _ in 0..3 {
            h.store.add_to_cart(&arroz);
        }
        let mut checkout = Checkout::new(&h.store);
        customer(&mut checkout, DeliveryMethod::Pickup);
        for _ in 0..3 {
            checkout.advance(&h.store).unwrap();
        }
        let order_id = checkout.confirm(&mut h.store).unwrap().order_id;
        assert_eq!(h.store.product(&id).unwrap().stock, 0);

        h.store.cancel_order(&order_id).unwrap();
        assert_eq!(h.store.product(&id).unwrap().stock, 3);
        assert_eq!(h.store.order(&order_id).unwrap().status, OrderStatus::Cancelled);
        assert!(matches!(
            h.store.advance_order(&order_id),
            Err(StoreError::Finished { .. })
        ));
        h.flush().await;

        let remote = h.backend().products().into_iter().find(|p| p.name == "Arroz").unwrap();
        assert_eq!(remote.stock, Some(3));
    })
    .await;
}

#[tokio::test]
async fn orders_in_mlc_use_mlc_prices() {
    local(async {
        let mut h = Harness::offline();
        h.store.toggle_currency();
        let product = h
            .store
            .products()
            .iter()
            .find(|p| !p.price_mlc.is_zero())
            .cloned()
            .unwrap();
        h.store.add_to_cart(&product);
        let zone = h.store.active_zones()[0].clone();
        let mut checkout = Checkout::new(&h.store);
        customer(&mut checkout, DeliveryMethod::Delivery);
        checkout.form_mut().zone_id = Some(zone.id.clone());
        for _ in 0..3 {
            checkout.advance(&h.store).unwrap();
        }
        let confirmation = checkout.confirm(&mut h.store).unwrap();
        assert_eq!(confirmation.currency, Currency::Mlc);
        let order = h.store.order(&confirmation.order_id).unwrap();
        assert_eq!(order.subtotal, product.price_mlc);
        assert_eq!(order.delivery_fee, zone.fee_mlc);
        assert!(order.is_consistent());
    })
    .await;
}

fn history(count: i64) -> Vec<Order> {
    let now = chrono::Utc::now();
    let start = now.timestamp_millis();
    (0..count)
        .map(|n| {
            Order::place(
                OrderId(format!("h-{n}")),
                OrderNumber::from_millis(start + n),
                OrderDraft {
                    customer_name: "Luis".into(),
                    customer_phone: "5357654321".into(),
                    customer_address: String::new(),
                    delivery_method: DeliveryMethod::Pickup,
                    delivery_zone: None,
                    delivery_fee: Money::ZERO,
                    currency: Currency::Cup,
                    payment_method: PaymentMethod::Cash,
                    notes: String::new(),
                },
                Vec::new(),
                now,
            )
        })
        .collect()
}

#[tokio::test]
async fn display_number_clash_does_not_block_checkout() {
    local(async {
        let mut h = Harness::offline();
        // Numbers for the next 20 seconds are all taken already.
        h.store.apply(StoreEvent::OrdersPulled {
            orders: history(20_000),
            origin: PullOrigin::ChangeFeed,
        });
        let product = h.store.products()[0].clone();
        h.store.add_to_cart(&product);

        let mut checkout = Checkout::new(&h.store);
        customer(&mut checkout, DeliveryMethod::Pickup);
        for _ in 0..3 {
            checkout.advance(&h.store).unwrap();
        }
        let confirmation = checkout.confirm(&mut h.store).unwrap();
        assert!(h.store.cart().is_empty());
        assert_eq!(h.store.orders()[0].id, confirmation.order_id);
        assert_eq!(h.store.orders().len(), 20_001);
    })
    .await;
}
