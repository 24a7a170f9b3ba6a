use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Mutex,
};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{DatasetSource, Direction, Projection, Row, Statement, StoreError, Value};

#[derive(Debug, Deserialize)]
struct DatasetFile {
    tables: BTreeMap<String, Vec<serde_json::Map<String, serde_json::Value>>>,
}

/// Table-per-dataset store evaluating [`Statement`]s in memory.
///
/// Every query's table is recorded so callers can assert which datasets a
/// pipeline touched.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: HashMap<String, Vec<Row>>,
    query_log: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty table. Querying it succeeds with zero rows, unlike
    /// an unregistered table.
    pub fn create_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    pub fn insert(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn insert_rows(&mut self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn table_len(&self, table: &str) -> Option<usize> {
        self.tables.get(table).map(Vec::len)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn from_json_str(raw: &str) -> Result<Self, StoreError> {
        let file: DatasetFile = serde_json::from_str(raw)?;
        let mut store = Self::new();
        for (table, rows) in file.tables {
            store.create_table(&table);
            for raw_row in rows {
                let mut row = Row::new();
                for (column, value) in raw_row {
                    row.insert(&column, Value::from_json(value)?);
                }
                store.insert(&table, row);
            }
        }
        Ok(store)
    }

    pub fn load_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            StoreError::Io(format!("failed reading {}: {err}", path.as_ref().display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Tables queried so far, in query order.
    pub fn queried_tables(&self) -> Vec<String> {
        self.query_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn execute(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        if let Ok(mut log) = self.query_log.lock() {
            log.push(statement.table().to_string());
        }
        let rows = self
            .tables
            .get(statement.table())
            .ok_or_else(|| StoreError::UnknownTable(statement.table().to_string()))?;

        let mut matched: Vec<&Row> = rows
            .iter()
            .filter(|row| statement.filters().iter().all(|filter| filter.matches(row)))
            .collect();

        if !statement.order().is_empty() {
            matched.sort_by(|a, b| {
                statement
                    .order()
                    .iter()
                    .map(|key| {
                        let ordering = a
                            .value_or_null(&key.column)
                            .total_cmp(b.value_or_null(&key.column));
                        match key.direction {
                            Direction::Asc => ordering,
                            Direction::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if let Some(limit) = statement.limit_value() {
            matched.truncate(limit);
        }

        Ok(matched
            .into_iter()
            .map(|row| match statement.projection() {
                Projection::All => row.clone(),
                Projection::Columns(columns) => columns
                    .iter()
                    .map(|column| (column.clone(), row.value_or_null(column).clone()))
                    .collect(),
            })
            .collect())
    }
}

#[async_trait]
impl DatasetSource for InMemoryStore {
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        self.execute(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> InMemoryStore {
        InMemoryStore::from_json_str(
            r#"{
                "tables": {
                    "bgs_hero_warband_stats": [
                        {"id": 1, "creationDate": "2026-10-01T00:00:00Z", "heroCardId": "H1", "turn": 3, "statsDelta": 12.5},
                        {"id": 2, "creationDate": "2026-10-02T00:00:00Z", "heroCardId": "H1", "turn": 1, "statsDelta": 4},
                        {"id": 3, "creationDate": "2026-10-02T00:00:00Z", "heroCardId": "H2", "turn": 2, "statsDelta": 9}
                    ],
                    "bgs_hero_combat_winrate": []
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn from_json_str_registers_tables_including_empty_ones() {
        let store = sample_store();
        assert_eq!(store.table_len("bgs_hero_warband_stats"), Some(3));
        assert_eq!(store.table_len("bgs_hero_combat_winrate"), Some(0));
        assert_eq!(
            store.table_names(),
            vec!["bgs_hero_combat_winrate", "bgs_hero_warband_stats"]
        );
    }

    #[test]
    fn execute_filters_orders_limits_and_projects() {
        let store = sample_store();
        let latest = store
            .execute(
                &Statement::select("bgs_hero_warband_stats", &["creationDate"])
                    .filter_not_null("creationDate")
                    .order_by("creationDate", Direction::Desc)
                    .limit(1),
            )
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].len(), 1);

        let snapshot = latest[0].get("creationDate").cloned().unwrap();
        let rows = store
            .execute(
                &Statement::select_all("bgs_hero_warband_stats")
                    .filter_eq("creationDate", snapshot)
                    .order_by("heroCardId", Direction::Asc)
                    .order_by("turn", Direction::Asc),
            )
            .unwrap();
        let ids: Vec<i64> = rows
            .iter()
            .map(|row| row.get("id").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn execute_rejects_unknown_tables() {
        let store = sample_store();
        let err = store
            .execute(&Statement::select_all("bgs_missing"))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(table) if table == "bgs_missing"));
        assert_eq!(
            store.queried_tables(),
            vec!["bgs_missing".to_string()]
        );
    }

    #[test]
    fn from_json_str_rejects_nested_values() {
        let err = InMemoryStore::from_json_str(r#"{"tables":{"t":[{"a":{"b":1}}]}}"#).unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
    }

    #[tokio::test]
    async fn dataset_source_query_delegates_to_execute() {
        let store = sample_store();
        let rows = store
            .query(&Statement::select_all("bgs_hero_warband_stats").filter_eq("heroCardId", "H2"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].require_f64("statsDelta"), Ok(9.0));
    }
}
