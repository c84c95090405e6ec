use std::collections::BTreeMap;

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use deck_terminal::backend::parse_catalog_json;
use deck_terminal::catalog::{Catalog, FilterConfig, Unit, filter_units};
use deck_terminal::deck::{DeckContext, validate_for_save};
use deck_terminal::demo::{seed_catalog, seed_ownership};
use deck_terminal::faction::{FactionRule, FactionTable};
use deck_terminal::recommend::{RecommendConfig, recommend, recommend_into};
use deck_terminal::state::AppState;

const NATIONS: &[&str] = &[
    "Germany",
    "Italy",
    "Japan",
    "United States",
    "United Kingdom",
    "Soviet Union",
    "France",
];

fn large_catalog(n: usize) -> Catalog {
    let units = (0..n)
        .map(|i| Unit {
            id: format!("unit-{i}"),
            name: format!("Unit {i}"),
            nation: NATIONS[i % NATIONS.len()].to_string(),
            unit_type: if i % 3 == 0 { "Soldier" } else { "Vehicle" }.to_string(),
            year: Some(1939 + (i % 7) as i32),
            points: 5 + (i % 40) as u32,
            set_name: "Bench".to_string(),
            rarity: "Common".to_string(),
            abilities: if i % 11 == 0 { "Heavy Armor" } else { "" }.to_string(),
            stats: (0..4u8)
                .map(|r| (r, ((i * 7 + r as usize) % 15) as f64))
                .collect::<BTreeMap<_, _>>(),
        })
        .collect::<Vec<_>>();
    Catalog::from(units)
}

fn bench_filter(c: &mut Criterion) {
    let catalog = large_catalog(5_000);
    let factions = FactionTable::default();
    let ownership = seed_ownership("bench-user", catalog.units());
    let filters = FilterConfig {
        search_text: "armor".to_string(),
        faction_rule: FactionRule::AxisOnly,
        owned_only: true,
        ..FilterConfig::default()
    };
    c.bench_function("filter_units_5k", |b| {
        b.iter(|| {
            let out = filter_units(
                black_box(&catalog),
                black_box(&filters),
                Some(&ownership),
                &factions,
            );
            black_box(out.len());
        })
    });
}

fn bench_recommend(c: &mut Criterion) {
    let catalog = large_catalog(5_000);
    let factions = FactionTable::default();
    let ownership = seed_ownership("bench-user", catalog.units());
    let ctx = DeckContext {
        catalog: &catalog,
        ownership: Some(&ownership),
        enforce_ownership: false,
        factions: &factions,
    };
    let candidates: Vec<&Unit> = catalog.units().iter().collect();
    c.bench_function("recommend_5k_cap300", |b| {
        b.iter(|| {
            let rec = recommend(black_box(&candidates), 300, &ctx, RecommendConfig::default());
            black_box(rec.spent);
        })
    });
}

fn bench_demo_state(c: &mut Criterion) {
    let mut state = AppState::new();
    state.catalog = Catalog::from(seed_catalog());
    c.bench_function("recommend_and_validate_demo", |b| {
        b.iter(|| {
            let mut deck = state.deck.clone();
            let candidates = state.filtered_units();
            recommend_into(&mut deck, &candidates, &state.deck_context(), state.recommend);
            black_box(validate_for_save(&deck, &state.deck_context()).is_ok());
        })
    });
}

fn bench_catalog_parse(c: &mut Criterion) {
    let raw = serde_json::to_string(large_catalog(1_000).units()).expect("serialize catalog");
    c.bench_function("catalog_parse_1k", |b| {
        b.iter(|| {
            let units = parse_catalog_json(black_box(&raw)).unwrap();
            black_box(units.len());
        })
    });
}

criterion_group!(
    perf,
    bench_filter,
    bench_recommend,
    bench_demo_state,
    bench_catalog_parse
);
criterion_main!(perf);
