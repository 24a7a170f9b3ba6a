//! Built-in sample datasets used when no dataset file is configured.

use chrono::{DateTime, Duration, TimeZone, Utc};
use store::{InMemoryStore, Row, Value};

use crate::api::{COMBAT_WINRATE, HERO_STATS, TRIBES_AT_END, WARBAND_STATS};

/// Midnight UTC of day `day` of the sample period.
pub fn snapshot_at(day: i64) -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(2026, 10, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    base + Duration::days(day)
}

/// A per-snapshot primary row: marks `hero_id` as active at `date`.
pub fn dated_hero_row(id: i64, hero_id: &str, date: DateTime<Utc>) -> Row {
    Row::new()
        .with("id", id)
        .with("date", date)
        .with("heroCardId", hero_id)
}

/// A current aggregate primary row (null date) with only popularity set.
pub fn current_hero_row(id: i64, hero_id: &str, popularity: f64) -> Row {
    Row::new()
        .with("id", id)
        .with("date", Value::Null)
        .with("heroCardId", hero_id)
        .with("popularity", popularity)
}

fn current_hero_metrics(
    id: i64,
    hero_id: &str,
    popularity: f64,
    average_position: f64,
    top4: f64,
    top1: f64,
    tier: &str,
) -> Row {
    current_hero_row(id, hero_id, popularity)
        .with("averagePosition", average_position)
        .with("top4", top4)
        .with("top1", top1)
        .with("tier", tier)
}

fn tribe_row(id: i64, date: DateTime<Utc>, hero_id: &str, tribe: &str, percent: f64) -> Row {
    Row::new()
        .with("id", id)
        .with("creationDate", date)
        .with("heroCardId", hero_id)
        .with("tribe", tribe)
        .with("percent", percent)
}

fn series_row(
    id: i64,
    date: DateTime<Utc>,
    hero_id: &str,
    turn: i64,
    column: &str,
    value: f64,
) -> Row {
    Row::new()
        .with("id", id)
        .with("creationDate", date)
        .with("heroCardId", hero_id)
        .with("turn", turn)
        .with(column, value)
}

const HERO_01: &str = "TB_BaconShop_HERO_01";
const HERO_02: &str = "TB_BaconShop_HERO_02";
const RETIRED_HERO: &str = "TB_BaconShop_HERO_RETIRED";

/// Two active heroes, one retired hero that only appears in older or
/// auxiliary rows, and two snapshots per auxiliary dataset.
pub fn sample_store() -> InMemoryStore {
    let mut store = InMemoryStore::new();

    store.insert_rows(
        HERO_STATS.table,
        [
            dated_hero_row(1, RETIRED_HERO, snapshot_at(0)),
            dated_hero_row(2, HERO_01, snapshot_at(0)),
            dated_hero_row(3, HERO_02, snapshot_at(1)),
            dated_hero_row(4, HERO_01, snapshot_at(1)),
            current_hero_metrics(5, HERO_01, 12.5, 4.12, 51.3, 13.9, "A"),
            current_hero_metrics(6, HERO_02, 8.25, 4.61, 44.0, 9.7, "C"),
            current_hero_metrics(7, RETIRED_HERO, 1.0, 5.2, 30.1, 5.0, "D"),
        ],
    );

    store.insert_rows(
        TRIBES_AT_END.table,
        [
            tribe_row(1, snapshot_at(0), HERO_01, "MECH", 70.0),
            tribe_row(2, snapshot_at(1), HERO_01, "BEAST", 40.0),
            tribe_row(3, snapshot_at(1), HERO_01, "Murloc", 35.5),
            tribe_row(4, snapshot_at(1), HERO_02, "DRAGON", 52.0),
            tribe_row(5, snapshot_at(1), RETIRED_HERO, "PIRATE", 61.0),
        ],
    );

    let mut warband = Vec::new();
    let mut winrate = Vec::new();
    let mut next_id = 1;
    for (hero_id, base) in [(HERO_01, 6.0), (HERO_02, 5.5), (RETIRED_HERO, 4.0)] {
        for turn in 1..=20_i64 {
            warband.push(series_row(
                next_id,
                snapshot_at(1),
                hero_id,
                turn,
                "statsDelta",
                base * turn as f64,
            ));
            winrate.push(series_row(
                next_id,
                snapshot_at(2),
                hero_id,
                turn,
                "winrate",
                (0.35 + turn as f64 * 0.01).min(1.0),
            ));
            next_id += 1;
        }
    }
    warband.push(series_row(
        next_id,
        snapshot_at(0),
        HERO_01,
        1,
        "statsDelta",
        999.0,
    ));
    store.insert_rows(WARBAND_STATS.table, warband);
    store.insert_rows(COMBAT_WINRATE.table, winrate);

    store
}

/// [`sample_store`] with `table` left unregistered, so querying it fails.
#[cfg(test)]
pub(crate) fn sample_store_without(table: &str) -> InMemoryStore {
    let full = sample_store();
    let mut store = InMemoryStore::new();
    for name in full.table_names() {
        if name == table {
            continue;
        }
        let rows = full
            .execute(&store::Statement::select_all(name))
            .expect("sample table should be queryable");
        store.insert_rows(name, rows);
    }
    store
}
