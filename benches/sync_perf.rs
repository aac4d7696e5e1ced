use chrono::{Duration, NaiveDate};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use interfaces_of_power::analytics::bucketing::period_of;
use interfaces_of_power::analytics::{Granularity, OrderingPolicy, aggregate_by_period, stack};
use interfaces_of_power::bus::ViewId;
use interfaces_of_power::config::EngineConfig;
use interfaces_of_power::model::{AdRecord, CategoryKey, Party, Record, RemovalRecord};
use interfaces_of_power::selection::{ChartMode, SelectionIntent};
use interfaces_of_power::session::Session;
use interfaces_of_power::store::{DatasetBundle, RecordStore};
use interfaces_of_power::views::FrameCollector;
use std::hint::black_box;

const REASONS: [&str; 12] = [
    "Defamation",
    "Privacy",
    "Copyright",
    "Spam",
    "Hate speech",
    "Impersonation",
    "Violence",
    "Trademark",
    "Fraud",
    "Regulated goods",
    "National security",
    "Counterfeit",
];

fn sample_bundle(weeks: i64) -> DatasetBundle {
    let start = NaiveDate::from_ymd_opt(2018, 5, 7).unwrap_or_default();
    let mut bundle = DatasetBundle::default();
    for w in 0..weeks {
        let date = start + Duration::weeks(w);
        for (i, party) in Party::ALL.into_iter().enumerate() {
            bundle.ads.push(AdRecord {
                date,
                party,
                spend: ((w * 37 + i as i64 * 11) % 997) as f64,
            });
        }
        for (i, reason) in REASONS.iter().enumerate() {
            bundle.removals.push(RemovalRecord {
                date,
                reason: (*reason).to_string(),
                total: ((w + i as i64) % 50) as f64,
            });
        }
    }
    bundle
}

fn bench_aggregate(c: &mut Criterion) {
    let store = RecordStore::from_bundle(sample_bundle(320)).unwrap();
    let records = store.load(interfaces_of_power::model::DatasetId::Removals).unwrap();
    let domain: Vec<CategoryKey> = REASONS.iter().map(|r| CategoryKey::from(*r)).collect();

    c.bench_function("aggregate_and_stack_removals", |b| {
        b.iter(|| {
            let series = aggregate_by_period(
                black_box(records),
                &domain,
                |r: &Record| r.timestamp().map(|ts| period_of(ts, Granularity::Month)),
                Record::category,
                Record::metric,
            );
            let layers = stack(&series, &domain, OrderingPolicy::DescendingByTotal);
            black_box(layers.len());
        })
    });
}

fn bench_broadcast(c: &mut Criterion) {
    c.bench_function("mode_toggle_broadcast", |b| {
        b.iter_batched(
            || {
                let mut session = futures::executor::block_on(Session::init(
                    &EngineConfig::default(),
                    sample_bundle(160).into_loads(),
                ))
                .unwrap();
                let sink = FrameCollector::new();
                for spec in EngineConfig::default().views {
                    if session.store().is_loaded(spec.dataset) {
                        session.mount_view(spec, sink.clone()).unwrap();
                    }
                }
                session
            },
            |mut session| {
                let origin = ViewId::from("ads");
                for mode in [ChartMode::Line, ChartMode::Stacked] {
                    let outcome = session
                        .on_user_selection_change(&origin, SelectionIntent::SetMode(mode))
                        .unwrap();
                    black_box(outcome.report.delivered.len());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(sync_perf, bench_aggregate, bench_broadcast);
criterion_main!(sync_perf);
