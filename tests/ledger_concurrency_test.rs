mod common;

use common::{counters, movement, TestApp};
use rust_decimal::Decimal;
use storefront_inventory::{entities::stock_movement::MovementKind, errors::ServiceError};
use uuid::Uuid;

struct Outcome {
    app: TestApp,
    product_id: Uuid,
    succeeded: usize,
    rejected: usize,
}

/// Seeds `stock` units and races `attempts` sells of `quantity` each.
async fn race_sells(stock: i32, quantity: i32, attempts: usize) -> Outcome {
    let app = TestApp::new().await;
    let (_, product) = app.seeded().await;
    app.record(&product, MovementKind::Purchase, stock)
        .await
        .expect("seed stock");

    let mut tasks = Vec::with_capacity(attempts);
    for _ in 0..attempts {
        let ledger = app.state.services.stock_ledger.clone();
        let input = movement(&product, MovementKind::Sell, Decimal::ONE, quantity);
        tasks.push(tokio::spawn(
            async move { ledger.record_movement(input).await },
        ));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => succeeded += 1,
            Err(ServiceError::InsufficientStock { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    Outcome {
        app,
        product_id: product.id,
        succeeded,
        rejected,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unit_sells_never_oversell() {
    let outcome = race_sells(10, 1, 20).await;

    assert_eq!(outcome.succeeded, 10, "exactly 10 sells should succeed");
    assert_eq!(outcome.rejected, 10);
    assert_eq!(
        outcome.app.counters(outcome.product_id).await,
        counters(10, 0, 10)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bulk_sells_stop_at_floor_of_stock() {
    let outcome = race_sells(10, 3, 8).await;

    assert_eq!(outcome.succeeded, 3);
    assert_eq!(outcome.rejected, 5);

    let report = outcome
        .app
        .state
        .services
        .stock_ledger
        .reconcile_product(outcome.product_id)
        .await
        .unwrap();
    assert!(report.matches);
    assert_eq!(report.live, counters(10, 1, 9));
    assert_eq!(report.movements_replayed, 4);
}
