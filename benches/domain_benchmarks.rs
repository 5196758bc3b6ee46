use criterion::{Criterion, criterion_group, criterion_main};
use rust_decimal::Decimal;
use std::hint::black_box;
use ticket_checkout::app::{ReferenceGenerator, parse_order_id, round_amount};
use ticket_checkout::domain::{Currency, ReserveSeatsRequest, amount_matches};
use validator::Validate;

fn bench_validation(c: &mut Criterion) {
    let request = ReserveSeatsRequest::new(
        "buyer-42",
        (1..=10).map(|i| format!("seat-{i}")).collect(),
    );

    c.bench_function("validate_reserve_request", |b| {
        b.iter(|| {
            let _ = black_box(&request).validate();
        })
    });
}

fn bench_reference(c: &mut Criterion) {
    let generator = ReferenceGenerator::default();
    let order_id = "0190a5b2-7c3d-7e4f-8a9b-0c1d2e3f4a5b";
    let reference = generator.reference(order_id);

    c.bench_function("generate_reference", |b| {
        b.iter(|| generator.reference(black_box(order_id)))
    });
    c.bench_function("parse_reference", |b| {
        b.iter(|| parse_order_id(black_box(&reference)))
    });
}

fn bench_amounts(c: &mut Criterion) {
    let usd = Decimal::from(300);
    let rate = Decimal::from(60_000);
    let expected = Decimal::new(500_000, 8);
    let received = Decimal::new(499_600, 8);

    c.bench_function("round_btc_amount", |b| {
        b.iter(|| round_amount(black_box(usd) / black_box(rate), Currency::Btc))
    });
    c.bench_function("amount_matches", |b| {
        b.iter(|| amount_matches(black_box(received), black_box(expected)))
    });
}

criterion_group!(benches, bench_validation, bench_reference, bench_amounts);
criterion_main!(benches);
