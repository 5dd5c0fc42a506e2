use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::NaiveDate;
use stockcast_core::{CalendarEvents, ConfidenceLevel, ObservationSeries, Subject};
use stockcast_forecast::{
    DecompositionConfig, FeatureEngineer, ForecastModel, RegressorContract, SmoothingModel,
};

fn series(days: usize) -> ObservationSeries {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let values = (0..days)
        .map(|i| 20.0 + (i % 7) as f64 * 3.0 + (i as f64 * 0.05).sin() * 4.0)
        .collect();
    ObservationSeries::from_values(start, values)
}

fn bench_feature_engineering(c: &mut Criterion) {
    let subject = Subject::sku("SAR-001").unwrap();
    let events = CalendarEvents::default().with_default_holidays();
    let engineer = FeatureEngineer::default();

    let mut group = c.benchmark_group("feature_engineering");
    for days in [90usize, 180, 365] {
        let history = series(days);
        group.bench_with_input(BenchmarkId::from_parameter(days), &history, |b, history| {
            b.iter(|| engineer.engineer(black_box(history), &events, &[], &subject))
        });
    }
    group.finish();
}

fn bench_fit_and_predict(c: &mut Criterion) {
    let subject = Subject::sku("SAR-001").unwrap();
    let events = CalendarEvents::default().with_default_holidays();
    let engineer = FeatureEngineer::default();
    let model = ForecastModel::new(60, 0.3, DecompositionConfig::default());
    let contract = RegressorContract::for_subject(&subject);

    let mut group = c.benchmark_group("decomposition_fit");
    group.sample_size(20);
    for days in [90usize, 180, 365] {
        let history = series(days);
        let rows = engineer.engineer(&history, &events, &[], &subject);
        group.bench_with_input(BenchmarkId::from_parameter(days), &rows, |b, rows| {
            b.iter(|| model.fit(&subject, black_box(rows), &contract, days as u32))
        });
    }
    group.finish();

    let history = series(365);
    let rows = engineer.engineer(&history, &events, &[], &subject);
    let fitted = model.fit(&subject, &rows, &contract, 365).unwrap().model;
    let start = history.end().unwrap().succ_opt().unwrap();
    let future = engineer.engineer_future(start, 90, &events, None, &subject);
    c.bench_function("decomposition_predict_90d", |b| {
        b.iter(|| fitted.forecast(black_box(&future), ConfidenceLevel::DEFAULT))
    });

    c.bench_function("smoothing_fit_365d", |b| {
        b.iter(|| SmoothingModel::fit(&subject, black_box(&rows), 0.3))
    });
}

criterion_group!(benches, bench_feature_engineering, bench_fit_and_predict);
criterion_main!(benches);
