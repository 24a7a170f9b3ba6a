use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Report constants
// ---------------------------------------------------------------------------

/// Identifier of the placeholder entity appended to every report.
pub const SENTINEL_HERO_ID: &str = "average";

/// Last turn kept in a hero's warband stats series.
pub const WARBAND_STATS_MAX_TURN: u32 = 15;

/// Last turn kept in a hero's combat winrate series.
pub const COMBAT_WINRATE_MAX_TURN: u32 = 18;

// ---------------------------------------------------------------------------
// Composite report types
// ---------------------------------------------------------------------------

/// Share of finished games in which the hero ended with a given tribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TribeStat {
    pub tribe: String,
    pub percent: f64,
}

/// Average total warband stats on a given turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarbandStat {
    pub turn: u32,
    pub total_stats: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatWinrate {
    pub turn: u32,
    pub winrate: f64,
}

/// One hero's row in the composite report.
///
/// Scalar metrics are `None` for heroes without a current aggregate row and
/// for the sentinel; they are omitted from the wire form in that case.
/// `combat_winrate` is `None` only when the report variant does not carry
/// the rate series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroStat {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top4: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default)]
    pub tribes_stat: Vec<TribeStat>,
    #[serde(default)]
    pub warband_stats: Vec<WarbandStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat_winrate: Option<Vec<CombatWinrate>>,
}

impl HeroStat {
    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_HERO_ID
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub hero_stats: Vec<HeroStat>,
}

impl GlobalStats {
    pub fn hero(&self, id: &str) -> Option<&HeroStat> {
        self.hero_stats.iter().find(|hero| hero.id == id)
    }
}

// ---------------------------------------------------------------------------
// Normalisation helpers
// ---------------------------------------------------------------------------

/// Tribe names arrive in whatever casing the producer used ("BEAST",
/// "Murloc", ...); the report carries them lowercased and otherwise as stored.
pub fn normalize_tribe(tribe: &str) -> String {
    tribe.to_lowercase()
}

/// Helper to create an identifier-only `HeroStat` with empty sub-collections.
pub fn hero_builder(id: &str) -> HeroStat {
    HeroStat {
        id: id.to_string(),
        average_position: None,
        popularity: None,
        top4: None,
        top1: None,
        tier: None,
        tribes_stat: vec![],
        warband_stats: vec![],
        combat_winrate: Some(vec![]),
    }
}
