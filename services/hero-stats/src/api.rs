use schema::{
    COMBAT_WINRATE_MAX_TURN, CombatWinrate, GlobalStats, SENTINEL_HERO_ID, TribeStat,
    WARBAND_STATS_MAX_TURN, WarbandStat, hero_builder, normalize_tribe,
};
use std::collections::{BTreeSet, HashMap};
use store::{DatasetSource, DecodeError, Direction, Row, Statement, StoreError, Value};
use tracing::{debug, info};

#[cfg(test)]
use store::InMemoryStore;

mod datasets;
mod report;
mod snapshot;

pub use datasets::{
    COMBAT_WINRATE, DatasetDescriptor, HERO_STATS, ScalarMetricsRow, TRIBES_AT_END, TribeRow,
    WARBAND_STATS, WarbandRow, WinrateRow,
};
pub use report::{ReportInputs, build_report};
pub use snapshot::{
    SnapshotId, current_entities, fetch_latest, fetch_scalar_metrics, fetch_snapshot_rows,
    latest_snapshot,
};

use datasets::{HERO_ID_COLUMN, HeroKeyed, decode_rows};

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("failed fetching {table}: {source}")]
    Fetch {
        table: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("no snapshot recorded in {table}")]
    EmptySnapshot { table: &'static str },
    #[error("malformed row in {table}: {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: DecodeError,
    },
}

/// Which sub-collections a report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportVariant {
    #[default]
    Full,
    /// Earlier report shape: no combat winrate series, and the winrate
    /// dataset is never queried.
    WarbandOnly,
}

impl ReportVariant {
    pub fn includes_combat_winrate(self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::WarbandOnly => "warband_only",
        }
    }

    pub fn from_raw(raw: Option<&str>) -> Result<Self, String> {
        match raw.map(str::trim) {
            None | Some("") | Some("full") => Ok(Self::Full),
            Some("warband_only") => Ok(Self::WarbandOnly),
            Some(other) => Err(format!(
                "report variant must be full or warband_only, got '{other}'"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub variant: ReportVariant,
    pub warband_max_turn: u32,
    pub winrate_max_turn: u32,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            variant: ReportVariant::Full,
            warband_max_turn: WARBAND_STATS_MAX_TURN,
            winrate_max_turn: COMBAT_WINRATE_MAX_TURN,
        }
    }
}

/// Resolves every dataset's latest snapshot, fetches the rows, and builds the
/// composite report. Any failure aborts the whole report.
pub async fn retrieve_global_stats(
    source: &dyn DatasetSource,
    options: &ReportOptions,
) -> Result<GlobalStats, StatsError> {
    let primary = async {
        let hero_ids = current_entities(source).await?;
        let scalar_metrics = fetch_scalar_metrics(source, &hero_ids).await?;
        Ok::<_, StatsError>((hero_ids, scalar_metrics))
    };
    let combat_winrates = async {
        if options.variant.includes_combat_winrate() {
            fetch_latest::<WinrateRow>(source, &COMBAT_WINRATE)
                .await
                .map(Some)
        } else {
            Ok(None)
        }
    };

    let ((hero_ids, scalar_metrics), tribes, warband_stats, combat_winrates) = tokio::try_join!(
        primary,
        fetch_latest::<TribeRow>(source, &TRIBES_AT_END),
        fetch_latest::<WarbandRow>(source, &WARBAND_STATS),
        combat_winrates,
    )?;

    let inputs = ReportInputs {
        hero_ids,
        scalar_metrics: Some(scalar_metrics),
        tribes: Some(tribes),
        warband_stats: Some(warband_stats),
        combat_winrates,
    };
    let report = build_report(&inputs, options);
    info!(
        heroes = report.hero_stats.len(),
        variant = options.variant.as_str(),
        "built global hero stats"
    );
    Ok(report)
}
