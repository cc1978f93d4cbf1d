//! End-to-end checkout tests over the in-memory store and service doubles.

use std::sync::Arc;

use checkout::{
    CheckoutError, CheckoutOrchestrator, CheckoutRequest, InMemoryDeliveryService,
    InMemoryPaymentGateway, InMemoryUserDirectory, PaymentMethodToken, StockLedger,
};
use common::{AttemptId, UserId};
use domain::{CartItem, DomainError, Money, OrderStatus, Product};
use store::{CommerceStore, InMemoryCommerceStore};

type Orchestrator = CheckoutOrchestrator<
    InMemoryCommerceStore,
    InMemoryPaymentGateway,
    InMemoryDeliveryService,
    InMemoryUserDirectory,
>;

struct Harness {
    store: InMemoryCommerceStore,
    gateway: InMemoryPaymentGateway,
    delivery: InMemoryDeliveryService,
    directory: InMemoryUserDirectory,
    orchestrator: Arc<Orchestrator>,
    user: UserId,
}

async fn harness(products: Vec<Product>) -> Harness {
    let store = InMemoryCommerceStore::new();
    for product in products {
        store.upsert_product(product).await.unwrap();
    }

    let gateway = InMemoryPaymentGateway::new();
    let delivery = InMemoryDeliveryService::new();
    let directory = InMemoryUserDirectory::new();
    let user = UserId::new();
    directory.insert(user, "ada@example.com");

    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        gateway.clone(),
        delivery.clone(),
        directory.clone(),
    ));

    Harness {
        store,
        gateway,
        delivery,
        directory,
        orchestrator,
        user,
    }
}

fn filter(on_hand: u32) -> Product {
    Product::new("AQ-FILTER-01", "Filtre", Money::from_cents(4900), on_hand)
}

fn tank(on_hand: u32) -> Product {
    Product::new("AQ-TANK-30", "30L tank", Money::from_cents(89900), on_hand)
}

fn request(user: UserId, items: Vec<CartItem>) -> CheckoutRequest {
    CheckoutRequest {
        user_id: user,
        items,
        shipping_address: "12 Rue des Sources, Lyon".to_string(),
        billing_address: None,
        payment_method: PaymentMethodToken::new("pm_visa"),
    }
}

#[tokio::test]
async fn happy_path_records_a_paid_order_and_settles_stock() {
    let h = harness(vec![filter(5), tank(2)]).await;

    let receipt = h
        .orchestrator
        .checkout(request(
            h.user,
            vec![
                CartItem::new("AQ-FILTER-01", 2),
                CartItem::new("AQ-TANK-30", 1),
            ],
        ))
        .await
        .unwrap();

    // Total computed from catalog prices, not anything client-supplied.
    assert_eq!(receipt.total.cents(), 2 * 4900 + 89900);

    let order = h
        .orchestrator
        .recorder()
        .get_order(receipt.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total_amount, receipt.total);
    assert_eq!(
        order.authorization_id.as_deref(),
        Some(receipt.authorization_id.as_str())
    );

    // Unit prices were copied at purchase time.
    let items = h
        .orchestrator
        .recorder()
        .items(receipt.order_id)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);

    // Stock settled, holds cleared.
    let p = h.store.get_product(&"AQ-FILTER-01".into()).await.unwrap().unwrap();
    assert_eq!(p.on_hand, 3);
    let t = h.store.get_product(&"AQ-TANK-30".into()).await.unwrap().unwrap();
    assert_eq!(t.on_hand, 1);
    assert_eq!(h.store.reservation_count().await, 0);

    // Exactly one hold opened and confirmed.
    assert_eq!(h.gateway.authorization_count(), 1);
    assert_eq!(h.gateway.confirmed_count(), 1);

    // The customer was told.
    let messages = h.delivery.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].subject, "Payment received for your order");
}

#[tokio::test]
async fn two_shoppers_racing_for_the_last_unit_get_one_order() {
    let h = harness(vec![filter(1)]).await;
    let other_user = UserId::new();
    h.directory.insert(other_user, "grace@example.com");

    let first = {
        let orchestrator = h.orchestrator.clone();
        let user = h.user;
        tokio::spawn(async move {
            orchestrator
                .checkout(request(user, vec![CartItem::new("AQ-FILTER-01", 1)]))
                .await
        })
    };
    let second = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .checkout(request(other_user, vec![CartItem::new("AQ-FILTER-01", 1)]))
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let won = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(won, 1);

    let lost = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        lost.as_ref().unwrap_err(),
        CheckoutError::InsufficientStock { product } if product.as_str() == "Filtre"
    ));

    let p = h.store.get_product(&"AQ-FILTER-01".into()).await.unwrap().unwrap();
    assert_eq!(p.on_hand, 0);
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn insufficient_stock_names_the_product() {
    let h = harness(vec![filter(3)]).await;

    let err = h
        .orchestrator
        .checkout(request(h.user, vec![CartItem::new("AQ-FILTER-01", 5)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::InsufficientStock { ref product } if product.as_str() == "Filtre"
    ));
    assert!(err.is_user_recoverable());
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn declined_payment_releases_holds_and_leaves_stock_untouched() {
    let h = harness(vec![filter(5)]).await;
    h.gateway.set_decline_next(true);

    let err = h
        .orchestrator
        .checkout(request(h.user, vec![CartItem::new("AQ-FILTER-01", 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::PaymentDeclined(_)));

    // No order, no residual hold, on_hand unchanged.
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.reservation_count().await, 0);
    let p = h.store.get_product(&"AQ-FILTER-01".into()).await.unwrap().unwrap();
    assert_eq!(p.on_hand, 5);

    // And no notification either.
    assert_eq!(h.delivery.sent_count(), 0);
}

#[tokio::test]
async fn retry_after_decline_neither_double_reserves_nor_double_charges() {
    let h = harness(vec![filter(2)]).await;
    h.gateway.set_decline_next(true);

    let cart = vec![CartItem::new("AQ-FILTER-01", 2)];
    let first = h.orchestrator.checkout(request(h.user, cart.clone())).await;
    assert!(first.is_err());
    assert_eq!(h.store.reservation_count().await, 0);

    // The identical cart snapshot goes through on the second attempt:
    // the first attempt's holds are fully gone.
    let receipt = h
        .orchestrator
        .checkout(request(h.user, cart))
        .await
        .unwrap();
    assert_eq!(receipt.total.cents(), 2 * 4900);

    // One hold per attempt, only the second confirmed.
    assert_eq!(h.gateway.authorization_count(), 2);
    assert_eq!(h.gateway.confirmed_count(), 1);
}

#[tokio::test]
async fn expired_holds_self_heal_without_release() {
    let h = harness(vec![filter(2)]).await;

    // An abandoned attempt reserved both units and never confirmed or
    // released; give it an already-elapsed TTL.
    let abandoned = StockLedger::with_ttl(h.store.clone(), chrono::Duration::zero());
    abandoned
        .reserve(AttemptId::new(), &"AQ-FILTER-01".into(), 2)
        .await
        .unwrap();
    assert_eq!(h.store.reservation_count().await, 1);

    // Availability is restored and a full checkout for the same units
    // succeeds, with no sweep having run.
    let receipt = h
        .orchestrator
        .checkout(request(h.user, vec![CartItem::new("AQ-FILTER-01", 2)]))
        .await
        .unwrap();
    assert_eq!(receipt.total.cents(), 2 * 4900);
}

#[tokio::test]
async fn gateway_outage_beyond_retries_releases_holds() {
    let h = harness(vec![filter(5)]).await;
    // More consecutive failures than the coordinator will retry.
    h.gateway.inject_gateway_failures(10);

    let err = h
        .orchestrator
        .checkout(request(h.user, vec![CartItem::new("AQ-FILTER-01", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Gateway(_)));
    assert!(!err.is_user_recoverable());

    assert_eq!(h.store.reservation_count().await, 0);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn unknown_product_aborts_before_any_reservation() {
    let h = harness(vec![filter(5)]).await;

    let err = h
        .orchestrator
        .checkout(request(
            h.user,
            vec![
                CartItem::new("AQ-GHOST", 1),
                CartItem::new("AQ-FILTER-01", 1),
            ],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::ProductUnavailable(_)));
    assert_eq!(h.store.reservation_count().await, 0);
}

#[tokio::test]
async fn empty_cart_and_bad_address_are_rejected_up_front() {
    let h = harness(vec![filter(5)]).await;

    let err = h
        .orchestrator
        .checkout(request(h.user, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Domain(DomainError::EmptyCart)
    ));

    let mut bad = request(h.user, vec![CartItem::new("AQ-FILTER-01", 1)]);
    bad.shipping_address = "   ".to_string();
    let err = h.orchestrator.checkout(bad).await.unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Domain(DomainError::InvalidAddress(_))
    ));

    assert_eq!(h.gateway.authorization_count(), 0);
}

#[tokio::test]
async fn notification_failure_never_fails_a_checkout() {
    let h = harness(vec![filter(5)]).await;
    h.delivery.set_fail_next(true);

    let receipt = h
        .orchestrator
        .checkout(request(h.user, vec![CartItem::new("AQ-FILTER-01", 1)]))
        .await
        .unwrap();

    // Order stands even though the message was dropped.
    let order = h
        .orchestrator
        .recorder()
        .get_order(receipt.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(h.delivery.sent_count(), 0);
}

#[tokio::test]
async fn live_tracking_follows_fulfillment_transitions() {
    let h = harness(vec![filter(5)]).await;

    let receipt = h
        .orchestrator
        .checkout(request(h.user, vec![CartItem::new("AQ-FILTER-01", 1)]))
        .await
        .unwrap();

    let recorder = h.orchestrator.recorder();
    let mut sub = recorder.subscribe(receipt.order_id).await.unwrap();

    recorder
        .update_status(receipt.order_id, OrderStatus::Processing)
        .await
        .unwrap();
    recorder
        .update_status(receipt.order_id, OrderStatus::Shipped)
        .await
        .unwrap();

    assert_eq!(sub.next_status().await, Some(OrderStatus::Processing));
    assert_eq!(sub.next_status().await, Some(OrderStatus::Shipped));
    sub.unsubscribe();
}
