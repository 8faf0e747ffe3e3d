use criterion::{criterion_group, criterion_main, Criterion};
use scanner_core::{evaluate, Event, FieldPath, Query, SortKey};
use serde_json::json;

const PLACES: [&str; 5] = ["Stockholm", "Solna", "Malmö", "Göteborg", "Uppsala"];
const KINDS: [&str; 4] = ["Stöld", "Rån", "Brand", "Trafikolycka"];

fn create_feed(n: u64) -> Vec<Event> {
    (0..n)
        .map(|id| {
            let place = PLACES[id as usize % PLACES.len()];
            let kind = KINDS[id as usize % KINDS.len()];
            Event::try_from(json!({
                "id": id,
                "datetime": format!("2025-03-{:02} 08:15:00 +01:00", id % 28 + 1),
                "name": format!("{:02} mars 08.15, {}, {}", id % 28 + 1, kind, place),
                "summary": format!("Polisen rapporterar {} i centrala {}", kind.to_lowercase(), place),
                "type": kind,
                "location": {"name": place, "gps": "59.33,18.06"},
            }))
            .unwrap()
        })
        .collect()
}

fn bench_strict_text(c: &mut Criterion) {
    let events = create_feed(5_000);
    let query = Query::new().with_text("rån stockholm");

    c.bench_function("strict text (5k events)", |b| {
        b.iter(|| evaluate(&events, &query).unwrap());
    });
}

fn bench_ranked(c: &mut Criterion) {
    let events = create_feed(5_000);
    let query = Query::new()
        .with_text("brand solna malmö")
        .with_strict(false)
        .with_limit(50);

    c.bench_function("ranked text + limit (5k events)", |b| {
        b.iter(|| evaluate(&events, &query).unwrap());
    });
}

fn bench_group(c: &mut Criterion) {
    let events = create_feed(5_000);
    let query = Query::new()
        .with_group_by(FieldPath::parse("location.name").unwrap())
        .with_filter(FieldPath::parse("type").unwrap(), "stöld");

    c.bench_function("group by location (5k events)", |b| {
        b.iter(|| evaluate(&events, &query).unwrap());
    });
}

fn bench_sort_by_field(c: &mut Criterion) {
    let events = create_feed(5_000);
    let query = Query::new().with_sort(vec![SortKey::parse("location.name").unwrap(), SortKey::Score]);

    c.bench_function("sort by field (5k events)", |b| {
        b.iter(|| evaluate(&events, &query).unwrap());
    });
}

criterion_group!(
    benches,
    bench_strict_text,
    bench_ranked,
    bench_group,
    bench_sort_by_field,
);
criterion_main!(benches);
