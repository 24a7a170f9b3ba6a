use super::*;

/// Row collections feeding the join. `None` means the collection was not
/// supplied and is treated exactly like an empty one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportInputs {
    pub hero_ids: Vec<String>,
    pub scalar_metrics: Option<Vec<ScalarMetricsRow>>,
    pub tribes: Option<Vec<TribeRow>>,
    pub warband_stats: Option<Vec<WarbandRow>>,
    pub combat_winrates: Option<Vec<WinrateRow>>,
}

fn index_by_hero<T: HeroKeyed>(rows: Option<&[T]>) -> HashMap<&str, Vec<&T>> {
    let mut index: HashMap<&str, Vec<&T>> = HashMap::new();
    for row in rows.unwrap_or_default() {
        index.entry(row.hero_id()).or_default().push(row);
    }
    index
}

/// Keeps points up to `max_turn`, ascending by turn. The sort is stable, so
/// the first row seen for a duplicated turn wins.
fn truncated_series<T, P>(
    rows: Option<&Vec<&T>>,
    turn: impl Fn(&T) -> u32,
    max_turn: u32,
    point: impl Fn(&T) -> P,
) -> Vec<P> {
    let mut kept: Vec<&T> = rows
        .map(|rows| {
            rows.iter()
                .copied()
                .filter(|row| turn(*row) <= max_turn)
                .collect()
        })
        .unwrap_or_default();
    kept.sort_by_key(|row| turn(*row));
    kept.dedup_by_key(|row| turn(*row));
    kept.into_iter().map(point).collect()
}

/// Merges the auxiliary datasets onto the enumerated heroes and appends the
/// sentinel entry.
///
/// Rows whose hero is not enumerated are dropped. The sentinel is appended
/// even if a real hero shares its id.
pub fn build_report(inputs: &ReportInputs, options: &ReportOptions) -> GlobalStats {
    let scalar_index = index_by_hero(inputs.scalar_metrics.as_deref());
    let tribe_index = index_by_hero(inputs.tribes.as_deref());
    let warband_index = index_by_hero(inputs.warband_stats.as_deref());
    let winrate_index = index_by_hero(inputs.combat_winrates.as_deref());

    let mut hero_stats = Vec::with_capacity(inputs.hero_ids.len() + 1);
    for hero_id in &inputs.hero_ids {
        let mut hero = hero_builder(hero_id);
        if let Some(metrics) = scalar_index
            .get(hero_id.as_str())
            .and_then(|rows| rows.first())
        {
            hero.popularity = metrics.popularity;
            hero.average_position = metrics.average_position;
            hero.top4 = metrics.top4;
            hero.top1 = metrics.top1;
            hero.tier = metrics.tier.clone();
        }
        hero.tribes_stat = tribe_index
            .get(hero_id.as_str())
            .map(|rows| {
                rows.iter()
                    .map(|row| TribeStat {
                        tribe: normalize_tribe(&row.tribe),
                        percent: row.percent,
                    })
                    .collect()
            })
            .unwrap_or_default();
        hero.warband_stats = truncated_series(
            warband_index.get(hero_id.as_str()),
            |row: &WarbandRow| row.turn,
            options.warband_max_turn,
            |row| WarbandStat {
                turn: row.turn,
                total_stats: row.stats_delta,
            },
        );
        hero.combat_winrate = options.variant.includes_combat_winrate().then(|| {
            truncated_series(
                winrate_index.get(hero_id.as_str()),
                |row: &WinrateRow| row.turn,
                options.winrate_max_turn,
                |row| CombatWinrate {
                    turn: row.turn,
                    winrate: row.winrate,
                },
            )
        });
        hero_stats.push(hero);
    }

    let mut sentinel = hero_builder(SENTINEL_HERO_ID);
    if !options.variant.includes_combat_winrate() {
        sentinel.combat_winrate = None;
    }
    hero_stats.push(sentinel);

    GlobalStats { hero_stats }
}
