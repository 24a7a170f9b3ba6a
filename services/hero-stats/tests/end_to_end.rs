use async_trait::async_trait;
use hero_stats::{
    api::{COMBAT_WINRATE, HERO_STATS, ReportOptions, TRIBES_AT_END, WARBAND_STATS},
    fixtures::{current_hero_row, dated_hero_row, snapshot_at},
    invoke,
    transport::HandlerOptions,
};
use schema::{SENTINEL_HERO_ID, WarbandStat};
use store::{DatasetSource, InMemoryStore, Row, Statement, StoreError};

/// Primary snapshot with heroes H1 and H2 plus one recorded row in every
/// auxiliary dataset, for a hero that is not current.
fn base_store() -> InMemoryStore {
    let mut store = InMemoryStore::new();
    store.insert_rows(
        HERO_STATS.table,
        [
            dated_hero_row(1, "H1", snapshot_at(3)),
            dated_hero_row(2, "H2", snapshot_at(3)),
            current_hero_row(3, "H1", 10.0),
            current_hero_row(4, "H2", 20.0),
        ],
    );
    store.insert(
        TRIBES_AT_END.table,
        Row::new()
            .with("creationDate", snapshot_at(3))
            .with("heroCardId", "RETIRED")
            .with("tribe", "PIRATE")
            .with("percent", 100.0),
    );
    for (table, column) in [
        (WARBAND_STATS.table, "statsDelta"),
        (COMBAT_WINRATE.table, "winrate"),
    ] {
        store.insert(
            table,
            Row::new()
                .with("creationDate", snapshot_at(3))
                .with("heroCardId", "RETIRED")
                .with("turn", 1_i64)
                .with(column, 0.5),
        );
    }
    store
}

fn uncompressed() -> HandlerOptions {
    HandlerOptions {
        compress: false,
        ..HandlerOptions::default()
    }
}

async fn report_json(store: &InMemoryStore) -> serde_json::Value {
    let envelope = invoke(store, &uncompressed()).await;
    assert_eq!(envelope.status_code, 200, "body: {}", envelope.body);
    serde_json::from_str(&envelope.body).expect("success body should be JSON")
}

#[tokio::test]
async fn heroes_without_auxiliary_rows_keep_scalars_and_empty_collections() {
    let json = report_json(&base_store()).await;
    let heroes = json["result"]["heroStats"]
        .as_array()
        .expect("heroStats should be an array");

    assert_eq!(heroes.len(), 3);
    assert_eq!(heroes[0]["id"], "H1");
    assert_eq!(heroes[0]["popularity"], 10.0);
    assert_eq!(heroes[1]["id"], "H2");
    assert_eq!(heroes[1]["popularity"], 20.0);
    for hero in &heroes[..2] {
        assert_eq!(hero["tribesStat"], serde_json::json!([]));
        assert_eq!(hero["warbandStats"], serde_json::json!([]));
        assert_eq!(hero["combatWinrate"], serde_json::json!([]));
    }

    let sentinel = &heroes[2];
    assert_eq!(sentinel["id"], SENTINEL_HERO_ID);
    assert!(sentinel.get("popularity").is_none());
    assert!(sentinel.get("tier").is_none());
    assert_eq!(sentinel["tribesStat"], serde_json::json!([]));
}

#[tokio::test]
async fn warband_series_is_truncated_and_ascending() {
    let mut store = base_store();
    for (turn, value) in [(5_i64, 1.0), (20, 2.0), (15, 3.0), (10, 4.0)] {
        store.insert(
            WARBAND_STATS.table,
            Row::new()
                .with("creationDate", snapshot_at(3))
                .with("heroCardId", "H1")
                .with("turn", turn)
                .with("statsDelta", value),
        );
    }

    let report = hero_stats::api::retrieve_global_stats(&store, &ReportOptions::default())
        .await
        .expect("report should build");
    let h1 = report.hero("H1").expect("H1 should be present");
    assert_eq!(
        h1.warband_stats,
        vec![
            WarbandStat {
                turn: 5,
                total_stats: 1.0
            },
            WarbandStat {
                turn: 10,
                total_stats: 4.0
            },
            WarbandStat {
                turn: 15,
                total_stats: 3.0
            },
        ]
    );
}

#[tokio::test]
async fn tribe_names_are_lowercased() {
    let mut store = base_store();
    store.insert(
        TRIBES_AT_END.table,
        Row::new()
            .with("creationDate", snapshot_at(3))
            .with("heroCardId", "H1")
            .with("tribe", "BEAST")
            .with("percent", 40.0),
    );

    let json = report_json(&store).await;
    assert_eq!(
        json["result"]["heroStats"][0]["tribesStat"],
        serde_json::json!([{ "tribe": "beast", "percent": 40.0 }])
    );
}

#[tokio::test]
async fn empty_auxiliary_dataset_yields_failure_envelope() {
    let mut store = InMemoryStore::new();
    for row in [
        dated_hero_row(1, "H1", snapshot_at(1)),
        current_hero_row(2, "H1", 10.0),
    ] {
        store.insert(HERO_STATS.table, row);
    }
    store.create_table(TRIBES_AT_END.table);
    store.create_table(WARBAND_STATS.table);
    store.create_table(COMBAT_WINRATE.table);

    let envelope = invoke(&store, &HandlerOptions::default()).await;
    assert_eq!(envelope.status_code, 500);
    assert!(!envelope.is_base64_encoded);
    let body: serde_json::Value =
        serde_json::from_str(&envelope.body).expect("failure body should be JSON");
    assert_eq!(body["message"], "not ok");
    assert!(
        body["exception"]
            .as_str()
            .expect("exception should be a string")
            .contains("no snapshot recorded")
    );
}

struct UnavailableSource;

#[async_trait]
impl DatasetSource for UnavailableSource {
    async fn query(&self, _statement: &Statement) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Io("connection refused".to_string()))
    }
}

#[tokio::test]
async fn unreachable_store_yields_failure_envelope_with_diagnostic() {
    let envelope = invoke(&UnavailableSource, &HandlerOptions::default()).await;
    assert_eq!(envelope.status_code, 500);
    assert!(envelope.body.contains("connection refused"));
}

#[tokio::test]
async fn compressed_reports_are_identical_across_invocations() {
    let store = base_store();
    let first = invoke(&store, &HandlerOptions::default()).await;
    let second = invoke(&store, &HandlerOptions::default()).await;
    assert_eq!(first.status_code, 200);
    assert_eq!(
        first.decoded_body().expect("first body should decode"),
        second.decoded_body().expect("second body should decode")
    );
}

#[tokio::test]
async fn dataset_file_fixtures_drive_the_same_pipeline() {
    let raw = r#"{
        "tables": {
            "bgs_hero_stats": [
                {"id": 1, "date": "2026-10-05T00:00:00Z", "heroCardId": "H9"},
                {"id": 2, "date": null, "heroCardId": "H9", "popularity": 3.5, "tier": "S"}
            ],
            "bgs_hero_tribes_at_end": [
                {"creationDate": "2026-10-05T00:00:00Z", "heroCardId": "H9", "tribe": "Elemental", "percent": 22.0}
            ],
            "bgs_hero_warband_stats": [
                {"creationDate": "2026-10-05T00:00:00Z", "heroCardId": "H9", "turn": 2, "statsDelta": 14.0}
            ],
            "bgs_hero_combat_winrate": [
                {"creationDate": "2026-10-05T00:00:00Z", "heroCardId": "H9", "turn": 2, "winrate": 0.61}
            ]
        }
    }"#;
    let store = InMemoryStore::from_json_str(raw).expect("fixture should load");

    let json = report_json(&store).await;
    let hero = &json["result"]["heroStats"][0];
    assert_eq!(hero["id"], "H9");
    assert_eq!(hero["tier"], "S");
    assert_eq!(hero["tribesStat"][0]["tribe"], "elemental");
    assert_eq!(hero["warbandStats"][0]["totalStats"], 14.0);
    assert_eq!(hero["combatWinrate"][0]["winrate"], 0.61);
}
