// tests/ingest_dedup.rs
use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use cpi_nowcast::ingest::dedupe;
use cpi_nowcast::ingest::types::Observation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SOURCES: [&str; 3] = ["apify_loblaws", "statcan_food_prices", "openfoodfacts_api"];
const ITEMS: [&str; 4] = ["milk", "eggs", "bread", "apples"];

fn random_batch(rng: &mut StdRng, len: usize) -> Vec<Observation> {
    (0..len)
        .map(|_| {
            let day = NaiveDate::from_ymd_opt(2026, 2, rng.random_range(10..=13)).unwrap();
            Observation::new(
                "food",
                ITEMS[rng.random_range(0..ITEMS.len())],
                rng.random_range(0.5..20.0),
                day,
                SOURCES[rng.random_range(0..SOURCES.len())],
            )
        })
        .collect()
}

#[test]
fn dedup_yields_unique_keys_holding_the_last_value() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..200 {
        let n = rng.random_range(0..60);
        let raw = random_batch(&mut rng, n);

        let mut last: HashMap<(String, String, NaiveDate), f64> = HashMap::new();
        for o in &raw {
            last.insert((o.source.clone(), o.item_id.clone(), o.observed_at), o.value);
        }

        let out = dedupe(raw);
        let keys: HashSet<_> = out
            .iter()
            .map(|o| (o.source.clone(), o.item_id.clone(), o.observed_at))
            .collect();
        assert_eq!(keys.len(), out.len(), "duplicate key in round {round}");
        assert_eq!(out.len(), last.len(), "lost a key in round {round}");
        for o in &out {
            let k = (o.source.clone(), o.item_id.clone(), o.observed_at);
            assert_eq!(last[&k], o.value, "round {round}: {k:?} kept an earlier value");
        }
    }
}

#[test]
fn dedup_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(7);
    let once = dedupe(random_batch(&mut rng, 80));
    let twice = dedupe(once.clone());
    assert_eq!(once, twice);
}
