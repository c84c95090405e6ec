use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, RANGE_COUNT};
use crate::deck::Deck;
use crate::faction::{DeckFaction, FactionTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckTotals {
    pub points: u32,
    pub effective_by_range: [f64; RANGE_COUNT],
    pub faction: DeckFaction,
    pub unit_count: u32,
}

impl Default for DeckTotals {
    fn default() -> Self {
        Self {
            points: 0,
            effective_by_range: [0.0; RANGE_COUNT],
            faction: DeckFaction::Empty,
            unit_count: 0,
        }
    }
}

/// Live totals for the deck. Entries whose unit is not in the catalog contribute nothing.
pub fn compute_totals(deck: &Deck, catalog: &Catalog, factions: &FactionTable) -> DeckTotals {
    let mut out = DeckTotals::default();
    for entry in deck.entries() {
        out.unit_count = out.unit_count.saturating_add(entry.count);
        let Some(unit) = catalog.get(&entry.unit_id) else {
            continue;
        };
        out.points = out
            .points
            .saturating_add(unit.points.saturating_mul(entry.count));
        for (range, total) in out.effective_by_range.iter_mut().enumerate() {
            *total += f64::from(entry.count) * unit.effective(range as u8);
        }
    }
    out.faction = classify_deck(deck, catalog, factions);
    out
}

pub fn deck_points(deck: &Deck, catalog: &Catalog) -> u32 {
    deck.entries()
        .iter()
        .filter_map(|e| catalog.get(&e.unit_id).map(|u| u.points.saturating_mul(e.count)))
        .fold(0u32, u32::saturating_add)
}

pub fn classify_deck(deck: &Deck, catalog: &Catalog, factions: &FactionTable) -> DeckFaction {
    factions.classify(
        deck.entries()
            .iter()
            .filter_map(|e| catalog.get(&e.unit_id))
            .map(|u| u.nation.as_str()),
    )
}
