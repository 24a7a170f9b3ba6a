use super::*;

/// Opaque, totally ordered snapshot identifier (normally a timestamp).
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotId(Value);

impl SnapshotId {
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

async fn run_query(
    source: &dyn DatasetSource,
    table: &'static str,
    statement: Statement,
) -> Result<Vec<Row>, StatsError> {
    let (sql, params) = statement.to_sql();
    debug!(table, %sql, params = params.len(), "dataset query");
    source
        .query(&statement)
        .await
        .map_err(|source| StatsError::Fetch { table, source })
}

/// Maximum non-null snapshot id in `dataset`.
///
/// An empty dataset has no latest snapshot and fails the request; null
/// snapshot values (the primary dataset's current aggregate rows) are never
/// considered.
pub async fn latest_snapshot(
    source: &dyn DatasetSource,
    dataset: &DatasetDescriptor,
) -> Result<SnapshotId, StatsError> {
    let statement = Statement::select(dataset.table, &[dataset.snapshot_column])
        .filter_not_null(dataset.snapshot_column)
        .order_by(dataset.snapshot_column, Direction::Desc)
        .limit(1);
    let rows = run_query(source, dataset.table, statement).await?;
    let Some(row) = rows.first() else {
        return Err(StatsError::EmptySnapshot {
            table: dataset.table,
        });
    };
    match row.get(dataset.snapshot_column) {
        Some(value) if !value.is_null() => Ok(SnapshotId(value.clone())),
        _ => Err(StatsError::EmptySnapshot {
            table: dataset.table,
        }),
    }
}

/// All rows of `dataset` belonging to `snapshot`, grouped by hero then turn
/// where the dataset has one.
pub async fn fetch_snapshot_rows(
    source: &dyn DatasetSource,
    dataset: &DatasetDescriptor,
    snapshot: &SnapshotId,
) -> Result<Vec<Row>, StatsError> {
    let mut statement = Statement::select_all(dataset.table)
        .filter_eq(dataset.snapshot_column, snapshot.value().clone())
        .order_by(HERO_ID_COLUMN, Direction::Asc);
    if dataset != &TRIBES_AT_END {
        statement = statement.order_by("turn", Direction::Asc);
    }
    run_query(source, dataset.table, statement).await
}

/// Resolves the latest snapshot of `dataset` and decodes its rows.
pub async fn fetch_latest<T>(
    source: &dyn DatasetSource,
    dataset: &DatasetDescriptor,
) -> Result<Vec<T>, StatsError>
where
    T: for<'a> TryFrom<&'a Row, Error = DecodeError>,
{
    let snapshot = latest_snapshot(source, dataset).await?;
    let rows = fetch_snapshot_rows(source, dataset, &snapshot).await?;
    info!(
        table = dataset.table,
        snapshot = %snapshot,
        rows = rows.len(),
        "resolved latest snapshot"
    );
    decode_rows(dataset.table, &rows)
}

/// Hero ids of the primary dataset's most recent dated snapshot, distinct and
/// sorted ascending.
pub async fn current_entities(source: &dyn DatasetSource) -> Result<Vec<String>, StatsError> {
    let snapshot = latest_snapshot(source, &HERO_STATS).await?;
    let statement = Statement::select(HERO_STATS.table, &[HERO_ID_COLUMN])
        .filter_eq(HERO_STATS.snapshot_column, snapshot.value().clone())
        .order_by(HERO_ID_COLUMN, Direction::Asc);
    let rows = run_query(source, HERO_STATS.table, statement).await?;

    let ids = rows
        .iter()
        .map(|row| {
            row.require_text(HERO_ID_COLUMN)
                .map(str::to_string)
                .map_err(|source| StatsError::Decode {
                    table: HERO_STATS.table,
                    source,
                })
        })
        .collect::<Result<BTreeSet<_>, _>>()?;
    info!(
        table = HERO_STATS.table,
        snapshot = %snapshot,
        heroes = ids.len(),
        "enumerated current heroes"
    );
    Ok(ids.into_iter().collect())
}

/// Current aggregate metric rows (null snapshot marker) for `hero_ids`.
pub async fn fetch_scalar_metrics(
    source: &dyn DatasetSource,
    hero_ids: &[String],
) -> Result<Vec<ScalarMetricsRow>, StatsError> {
    if hero_ids.is_empty() {
        return Ok(Vec::new());
    }
    let statement = Statement::select_all(HERO_STATS.table)
        .filter_null(HERO_STATS.snapshot_column)
        .filter_in(HERO_ID_COLUMN, hero_ids.iter().cloned())
        .order_by(HERO_ID_COLUMN, Direction::Asc);
    let rows = run_query(source, HERO_STATS.table, statement).await?;
    decode_rows(HERO_STATS.table, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{dated_hero_row, current_hero_row, snapshot_at};

    #[tokio::test]
    async fn latest_snapshot_picks_maximum_and_ignores_null_dates() {
        let mut store = InMemoryStore::new();
        store.insert(HERO_STATS.table, dated_hero_row(1, "H1", snapshot_at(2)));
        store.insert(HERO_STATS.table, dated_hero_row(2, "H1", snapshot_at(5)));
        store.insert(HERO_STATS.table, dated_hero_row(3, "H1", snapshot_at(3)));
        store.insert(HERO_STATS.table, current_hero_row(4, "H1", 10.0));

        let snapshot = latest_snapshot(&store, &HERO_STATS).await.unwrap();
        assert_eq!(snapshot.value(), &Value::Timestamp(snapshot_at(5)));
    }

    #[tokio::test]
    async fn latest_snapshot_fails_on_empty_dataset() {
        let mut store = InMemoryStore::new();
        store.create_table(TRIBES_AT_END.table);
        store.insert(HERO_STATS.table, current_hero_row(1, "H1", 10.0));

        let err = latest_snapshot(&store, &TRIBES_AT_END).await.unwrap_err();
        assert!(matches!(
            err,
            StatsError::EmptySnapshot {
                table: "bgs_hero_tribes_at_end"
            }
        ));

        // Only undated aggregate rows: still no snapshot to resolve.
        let err = latest_snapshot(&store, &HERO_STATS).await.unwrap_err();
        assert!(matches!(err, StatsError::EmptySnapshot { .. }));
    }

    #[tokio::test]
    async fn latest_snapshot_surfaces_fetch_failures() {
        let store = InMemoryStore::new();
        let err = latest_snapshot(&store, &WARBAND_STATS).await.unwrap_err();
        assert!(matches!(
            err,
            StatsError::Fetch {
                table: "bgs_hero_warband_stats",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn current_entities_returns_distinct_sorted_ids_of_latest_snapshot() {
        let mut store = InMemoryStore::new();
        store.insert(HERO_STATS.table, dated_hero_row(1, "OLD", snapshot_at(1)));
        store.insert(HERO_STATS.table, dated_hero_row(2, "H2", snapshot_at(2)));
        store.insert(HERO_STATS.table, dated_hero_row(3, "H1", snapshot_at(2)));
        store.insert(HERO_STATS.table, dated_hero_row(4, "H2", snapshot_at(2)));

        let ids = current_entities(&store).await.unwrap();
        assert_eq!(ids, vec!["H1".to_string(), "H2".to_string()]);
    }

    #[tokio::test]
    async fn fetch_latest_only_returns_rows_of_newest_snapshot() {
        let mut store = InMemoryStore::new();
        store.insert(
            WARBAND_STATS.table,
            Row::new()
                .with("creationDate", snapshot_at(1))
                .with("heroCardId", "H1")
                .with("turn", 4_i64)
                .with("statsDelta", 99.0),
        );
        store.insert(
            WARBAND_STATS.table,
            Row::new()
                .with("creationDate", snapshot_at(2))
                .with("heroCardId", "H1")
                .with("turn", 4_i64)
                .with("statsDelta", 20.0),
        );

        let rows: Vec<WarbandRow> = fetch_latest(&store, &WARBAND_STATS).await.unwrap();
        assert_eq!(
            rows,
            vec![WarbandRow {
                hero_id: "H1".into(),
                turn: 4,
                stats_delta: 20.0,
            }]
        );
    }

    #[tokio::test]
    async fn fetch_latest_fails_fast_on_undecodable_rows() {
        let mut store = InMemoryStore::new();
        store.insert(
            COMBAT_WINRATE.table,
            Row::new()
                .with("creationDate", snapshot_at(1))
                .with("heroCardId", "H1")
                .with("turn", 2_i64),
        );

        let err = fetch_latest::<WinrateRow>(&store, &COMBAT_WINRATE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StatsError::Decode {
                table: "bgs_hero_combat_winrate",
                source: DecodeError::MissingColumn { .. }
            }
        ));
    }

    #[tokio::test]
    async fn fetch_scalar_metrics_reads_only_current_rows_for_requested_heroes() {
        let mut store = InMemoryStore::new();
        store.insert(HERO_STATS.table, dated_hero_row(1, "H1", snapshot_at(1)));
        store.insert(HERO_STATS.table, current_hero_row(2, "H1", 10.0));
        store.insert(HERO_STATS.table, current_hero_row(3, "H3", 30.0));

        let rows = fetch_scalar_metrics(&store, &["H1".to_string()]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hero_id, "H1");
        assert_eq!(rows[0].popularity, Some(10.0));

        assert!(fetch_scalar_metrics(&store, &[]).await.unwrap().is_empty());
    }
}
