use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ow_status::advisory::maintenance::{assess_text, visible_text};
use ow_status::aggregate::aggregate;
use ow_status::platform::signal::{KeywordSignal, SoftSignalSource};
use ow_status::platform::{derive_state, HardChecks};
use ow_status::probe::latency::RegionMeasurement;
use ow_status::severity::{classify, Severity, Thresholds};
use ow_status::state::history::{uptimes, HistoryEntry, HISTORY_LIMIT};

fn full_history() -> Vec<HistoryEntry> {
    let start = Utc
        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .expect("valid date");
    (0..HISTORY_LIMIT)
        .map(|i| HistoryEntry {
            at: start + Duration::hours(i as i64),
            ok: i % 7 != 0,
        })
        .collect()
}

fn status_page() -> String {
    let mut html = String::from("<html><head><script>var x = 'outage';</script></head><body>");
    for i in 0..200 {
        html.push_str(&format!(
            "<div class=\"row\"><span>Service {i}</span><p>Operational</p></div>"
        ));
    }
    html.push_str("<p>Overwatch scheduled maintenance Tue, 3 Nov 2026</p></body></html>");
    html
}

fn bench_decisions(c: &mut Criterion) {
    let thresholds = Thresholds::default();
    let regions = vec![
        RegionMeasurement::from_samples("EU", &[Some(32.5), Some(41.0)]),
        RegionMeasurement::from_samples("NA", &[Some(120.0), None]),
        RegionMeasurement::from_samples("ASIA", &[Some(260.0), Some(244.0)]),
    ];

    c.bench_function("classify/sweep", |b| {
        b.iter(|| {
            (0..500)
                .map(|ms| classify(black_box(Some(f64::from(ms))), &thresholds))
                .max()
        })
    });

    c.bench_function("derive_state/all_combinations", |b| {
        b.iter(|| {
            let mut n = 0usize;
            for mask in 0u8..8 {
                let hard = HardChecks {
                    dns: mask & 1 != 0,
                    tcp: mask & 2 != 0,
                    http: mask & 4 != 0,
                };
                for soft in Severity::ALL {
                    n += derive_state(black_box(hard), black_box(soft), 2).rank() as usize;
                }
            }
            n
        })
    });

    c.bench_function("aggregate/three_regions", |b| {
        b.iter(|| aggregate(black_box(Severity::Ok), black_box(&regions), &thresholds, Some(2)))
    });

    let history = full_history();
    c.bench_function("uptimes/full_window", |b| {
        b.iter(|| uptimes(black_box(&history)))
    });
}

fn bench_scraping(c: &mut Criterion) {
    let html = status_page();
    let text = visible_text(&html).expect("parse page");
    let signal = KeywordSignal::new(&ow_status::config::KeywordConfig {
        bad: vec!["major outage".into(), "outage".into()],
        warn: vec!["degraded".into(), "maintenance".into()],
        ok: vec!["operational".into()],
    });

    c.bench_function("maintenance/visible_text", |b| {
        b.iter(|| visible_text(black_box(&html)).expect("parse page").len())
    });

    c.bench_function("maintenance/assess_text", |b| {
        b.iter(|| assess_text(black_box(&text), "overwatch"))
    });

    c.bench_function("keyword_signal/assess", |b| {
        b.iter(|| signal.assess(black_box(&html)))
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_decisions(c);
    bench_scraping(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
