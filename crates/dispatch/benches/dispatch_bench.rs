use common::{DriverId, OrderId, RestaurantId};
use criterion::{Criterion, criterion_group, criterion_main};
use dispatch::{DispatchEngine, DistanceScorer, InMemoryDispatchStore, StraightLineScorer};
use domain::{
    GeoPoint, InMemoryDriverNotifier, InMemoryDriverRegistry, InMemoryOrderStore, Order,
    OrderStatus, OrderStore,
};
use outbox::InMemoryOutboxStore;

fn bench_scoring(c: &mut Criterion) {
    let scorer = StraightLineScorer;
    let restaurant = GeoPoint::new(40.73, -74.00);
    let drivers: Vec<GeoPoint> = (0..500)
        .map(|i| GeoPoint::new(40.0 + (i as f64) * 0.003, -74.0 + (i as f64) * 0.001))
        .collect();

    c.bench_function("dispatch/score_500_drivers", |b| {
        b.iter(|| {
            drivers
                .iter()
                .map(|d| scorer.score(d, &restaurant))
                .fold(f64::MAX, f64::min)
        });
    });
}

fn bench_start_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("dispatch/start_dispatch_100_drivers", |b| {
        b.iter(|| {
            rt.block_on(async {
                let orders = InMemoryOrderStore::new();
                let registry = InMemoryDriverRegistry::new();
                let engine = DispatchEngine::new(
                    orders.clone(),
                    registry.clone(),
                    InMemoryDispatchStore::new(),
                    InMemoryDriverNotifier::new(),
                    InMemoryOutboxStore::new(),
                );

                let mut order = Order::submitted(
                    OrderId::new(),
                    RestaurantId::new(),
                    GeoPoint::new(40.75, -73.98),
                    GeoPoint::new(40.73, -74.00),
                );
                order.status = OrderStatus::Accepted;
                let order_id = order.id;
                orders.insert(order).await.unwrap();

                for i in 0..100 {
                    registry.add_driver(
                        DriverId::new(),
                        GeoPoint::new(40.0 + (i as f64) * 0.01, -74.0),
                    );
                }

                engine.start_dispatch(order_id).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_scoring, bench_start_dispatch);
criterion_main!(benches);
