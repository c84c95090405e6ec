use serde::{Deserialize, Serialize};

use crate::catalog::Unit;
use crate::deck::{Deck, DeckContext, DeckEntry};

pub const DEFAULT_RESERVE_MARGIN: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendConfig {
    /// Minimum headroom that must remain before another copy is considered.
    pub reserve_margin: u32,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            reserve_margin: DEFAULT_RESERVE_MARGIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub entries: Vec<DeckEntry>,
    pub spent: u32,
}

/// Damage per point over all four ranges.
pub fn unit_score(unit: &Unit) -> f64 {
    unit.effective_total() / f64::from(unit.points.max(1))
}

/// Greedy single pass over `candidates` (already filtered, in catalog order).
pub fn recommend(
    candidates: &[&Unit],
    point_cap: u32,
    ctx: &DeckContext<'_>,
    cfg: RecommendConfig,
) -> Recommendation {
    let mut ranked: Vec<(f64, &Unit)> = candidates.iter().map(|u| (unit_score(u), *u)).collect();
    // Stable: equal scores keep catalog order.
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut entries: Vec<DeckEntry> = Vec::new();
    let mut spent = 0u32;

    for (_, unit) in ranked {
        if spent >= point_cap.saturating_sub(1) {
            break;
        }
        if entries.iter().any(|e| e.unit_id == unit.id) {
            // Duplicate candidate rows share one copy budget.
            continue;
        }
        let copy_cap = ctx.copy_cap(&unit.id).unwrap_or(u32::MAX);
        // A free unit never moves `spent`, so one copy is all it can add.
        let copy_cap = if unit.points == 0 { copy_cap.min(1) } else { copy_cap };

        let mut copies = 0u32;
        while spent.saturating_add(unit.points) <= point_cap
            && copies < copy_cap
            && point_cap - spent >= cfg.reserve_margin
        {
            spent += unit.points;
            copies += 1;
        }
        if copies > 0 {
            entries.push(DeckEntry {
                unit_id: unit.id.clone(),
                count: copies,
            });
        }
    }

    Recommendation { entries, spent }
}

/// Runs the recommender and replaces the deck's entries; name, cap and rule stay.
pub fn recommend_into(
    deck: &mut Deck,
    candidates: &[&Unit],
    ctx: &DeckContext<'_>,
    cfg: RecommendConfig,
) -> u32 {
    let rec = recommend(candidates, deck.point_cap, ctx, cfg);
    deck.replace_entries(rec.entries);
    rec.spent
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn unit(points: u32, stats: &[f64]) -> Unit {
        Unit {
            id: "u".to_string(),
            name: "U".to_string(),
            nation: "Germany".to_string(),
            unit_type: "Vehicle".to_string(),
            year: None,
            points,
            set_name: String::new(),
            rarity: String::new(),
            abilities: String::new(),
            stats: stats
                .iter()
                .enumerate()
                .map(|(r, v)| (r as u8, *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn score_uses_all_ranges_and_floors_points() {
        assert_eq!(unit_score(&unit(10, &[10.0, 5.0, 5.0])), 2.0);
        assert_eq!(unit_score(&unit(0, &[3.0, 1.0])), 4.0);
    }
}
