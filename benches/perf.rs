use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use std::hint::black_box;

use nba_medallion::bronze::load_batch;
use nba_medallion::forest::{ForestParams, RandomForestRegressor, Regressor};
use nba_medallion::game_log::{PlayerGameLog, parse_league_game_log};
use nba_medallion::warehouse::init_schema;

fn synthetic_batch(rows: usize) -> Vec<PlayerGameLog> {
    let template = parse_league_game_log(LEAGUE_GAME_LOG_JSON, "2024-25", Utc::now())
        .expect("valid fixture json")
        .remove(0);
    (0..rows)
        .map(|i| PlayerGameLog {
            game_id: format!("00224{:05}", i / 12),
            player_id: (i % 12) as i64 + 1,
            ..template.clone()
        })
        .collect()
}

fn bench_game_log_parse(c: &mut Criterion) {
    c.bench_function("league_game_log_parse", |b| {
        b.iter(|| {
            let rows =
                parse_league_game_log(black_box(LEAGUE_GAME_LOG_JSON), "2024-25", Utc::now())
                    .unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_bronze_merge(c: &mut Criterion) {
    let batch = synthetic_batch(2_000);
    c.bench_function("bronze_merge_2000", |b| {
        b.iter(|| {
            let mut conn = Connection::open_in_memory().unwrap();
            init_schema(&conn).unwrap();
            let report = load_batch(&mut conn, black_box(&batch)).unwrap();
            black_box(report);
        })
    });
}

fn bench_forest_fit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let x = (0..2_000)
        .map(|_| (0..8).map(|_| rng.gen_range(0.0..40.0)).collect::<Vec<f64>>())
        .collect::<Vec<_>>();
    let y = x
        .iter()
        .map(|row| 0.8 * row[0] + 0.1 * row[4] - 0.2 * row[5] + rng.gen_range(-3.0..3.0))
        .collect::<Vec<_>>();
    let params = ForestParams {
        n_estimators: 20,
        ..ForestParams::default()
    };

    c.bench_function("forest_fit_2000x8_20_trees", |b| {
        b.iter(|| {
            let mut rf = RandomForestRegressor::new(params);
            rf.fit(black_box(&x), black_box(&y)).unwrap();
            black_box(rf.n_trees());
        })
    });
}

criterion_group!(
    perf,
    bench_game_log_parse,
    bench_bronze_merge,
    bench_forest_fit
);
criterion_main!(perf);

static LEAGUE_GAME_LOG_JSON: &str = include_str!("../tests/fixtures/leaguegamelog.json");
