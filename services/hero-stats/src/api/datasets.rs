use super::*;

/// Where one dataset lives and which column carries its snapshot id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub table: &'static str,
    pub snapshot_column: &'static str,
}

pub const HERO_STATS: DatasetDescriptor = DatasetDescriptor {
    table: "bgs_hero_stats",
    snapshot_column: "date",
};

pub const TRIBES_AT_END: DatasetDescriptor = DatasetDescriptor {
    table: "bgs_hero_tribes_at_end",
    snapshot_column: "creationDate",
};

pub const WARBAND_STATS: DatasetDescriptor = DatasetDescriptor {
    table: "bgs_hero_warband_stats",
    snapshot_column: "creationDate",
};

pub const COMBAT_WINRATE: DatasetDescriptor = DatasetDescriptor {
    table: "bgs_hero_combat_winrate",
    snapshot_column: "creationDate",
};

pub(crate) const HERO_ID_COLUMN: &str = "heroCardId";

/// Current aggregate metrics for one hero (primary rows with a null date).
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarMetricsRow {
    pub hero_id: String,
    pub popularity: Option<f64>,
    pub average_position: Option<f64>,
    pub top4: Option<f64>,
    pub top1: Option<f64>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TribeRow {
    pub hero_id: String,
    pub tribe: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarbandRow {
    pub hero_id: String,
    pub turn: u32,
    pub stats_delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WinrateRow {
    pub hero_id: String,
    pub turn: u32,
    pub winrate: f64,
}

impl TryFrom<&Row> for ScalarMetricsRow {
    type Error = DecodeError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            hero_id: row.require_text(HERO_ID_COLUMN)?.to_string(),
            popularity: row.optional_f64("popularity")?,
            average_position: row.optional_f64("averagePosition")?,
            top4: row.optional_f64("top4")?,
            top1: row.optional_f64("top1")?,
            tier: row.optional_text("tier")?.map(str::to_string),
        })
    }
}

impl TryFrom<&Row> for TribeRow {
    type Error = DecodeError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            hero_id: row.require_text(HERO_ID_COLUMN)?.to_string(),
            tribe: row.require_text("tribe")?.to_string(),
            percent: row.require_f64("percent")?,
        })
    }
}

impl TryFrom<&Row> for WarbandRow {
    type Error = DecodeError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            hero_id: row.require_text(HERO_ID_COLUMN)?.to_string(),
            turn: row.require_u32("turn")?,
            stats_delta: row.require_f64("statsDelta")?,
        })
    }
}

impl TryFrom<&Row> for WinrateRow {
    type Error = DecodeError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            hero_id: row.require_text(HERO_ID_COLUMN)?.to_string(),
            turn: row.require_u32("turn")?,
            winrate: row.require_f64("winrate")?,
        })
    }
}

/// Joined rows that carry the hero they belong to.
pub(crate) trait HeroKeyed {
    fn hero_id(&self) -> &str;
}

impl HeroKeyed for ScalarMetricsRow {
    fn hero_id(&self) -> &str {
        &self.hero_id
    }
}

impl HeroKeyed for TribeRow {
    fn hero_id(&self) -> &str {
        &self.hero_id
    }
}

impl HeroKeyed for WarbandRow {
    fn hero_id(&self) -> &str {
        &self.hero_id
    }
}

impl HeroKeyed for WinrateRow {
    fn hero_id(&self) -> &str {
        &self.hero_id
    }
}

pub(crate) fn decode_rows<T>(table: &'static str, rows: &[Row]) -> Result<Vec<T>, StatsError>
where
    T: for<'a> TryFrom<&'a Row, Error = DecodeError>,
{
    rows.iter()
        .map(|row| T::try_from(row).map_err(|source| StatsError::Decode { table, source }))
        .collect()
}
