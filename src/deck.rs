use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, OwnershipMap, Unit};
use crate::error::ValidationError;
use crate::faction::{FactionRule, FactionTable};
use crate::totals::{DeckTotals, compute_totals, deck_points};

pub const POINT_CAP_PRESETS: &[u32] = &[50, 100, 150, 200, 300];
pub const DEFAULT_POINT_CAP: u32 = 100;
pub const DEFAULT_DECK_NAME: &str = "Untitled deck";

/// Closest preset to `value`; ties go to the smaller cap.
pub fn snap_point_cap(value: u32) -> u32 {
    POINT_CAP_PRESETS
        .iter()
        .copied()
        .min_by_key(|cap| cap.abs_diff(value))
        .unwrap_or(DEFAULT_POINT_CAP)
}

pub fn next_point_cap(current: u32) -> u32 {
    POINT_CAP_PRESETS
        .iter()
        .copied()
        .find(|cap| *cap > current)
        .unwrap_or(POINT_CAP_PRESETS[0])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckEntry {
    pub unit_id: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub name: String,
    pub point_cap: u32,
    pub faction_rule: FactionRule,
    entries: Vec<DeckEntry>,
}

impl Default for Deck {
    fn default() -> Self {
        Self::new(DEFAULT_DECK_NAME, DEFAULT_POINT_CAP, FactionRule::Mixed)
    }
}

impl Deck {
    pub fn new(name: impl Into<String>, point_cap: u32, faction_rule: FactionRule) -> Self {
        Self {
            name: name.into(),
            point_cap,
            faction_rule,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[DeckEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_of(&self, unit_id: &str) -> u32 {
        self.entries
            .iter()
            .find(|e| e.unit_id == unit_id)
            .map(|e| e.count)
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Swaps in a whole new entry list (recommender output). Zero counts are dropped.
    pub fn replace_entries(&mut self, entries: Vec<DeckEntry>) {
        self.entries = entries.into_iter().filter(|e| e.count > 0).collect();
    }

    fn increment(&mut self, unit_id: &str) {
        match self.entries.iter_mut().find(|e| e.unit_id == unit_id) {
            Some(entry) => entry.count += 1,
            None => self.entries.push(DeckEntry {
                unit_id: unit_id.to_string(),
                count: 1,
            }),
        }
    }
}

/// Everything the validator needs besides the deck itself.
#[derive(Debug, Clone, Copy)]
pub struct DeckContext<'a> {
    pub catalog: &'a Catalog,
    pub ownership: Option<&'a OwnershipMap>,
    pub enforce_ownership: bool,
    pub factions: &'a FactionTable,
}

impl DeckContext<'_> {
    /// `None` means no cap. A missing record is unlimited unless ownership is enforced.
    pub fn copy_cap(&self, unit_id: &str) -> Option<u32> {
        match self.ownership.and_then(|map| map.get(unit_id)) {
            Some(record) => Some(record.copies),
            None if self.enforce_ownership => Some(0),
            None => None,
        }
    }
}

/// Checks adding one copy of `unit`, reporting the first rule that fails.
pub fn check_add(unit: &Unit, deck: &Deck, ctx: &DeckContext<'_>) -> Result<(), ValidationError> {
    if let Some(cap) = ctx.copy_cap(&unit.id)
        && deck.count_of(&unit.id) >= cap
    {
        return Err(ValidationError::CopyCapExceeded {
            unit: unit.name.clone(),
            cap,
        });
    }

    let points = deck_points(deck, ctx.catalog).saturating_add(unit.points);
    if points > deck.point_cap {
        return Err(ValidationError::PointCapExceeded {
            points,
            cap: deck.point_cap,
        });
    }

    if deck.faction_rule != FactionRule::Mixed {
        let nations = deck
            .entries()
            .iter()
            .filter_map(|e| ctx.catalog.get(&e.unit_id))
            .map(|u| u.nation.as_str())
            .chain(std::iter::once(unit.nation.as_str()));
        let found = ctx.factions.classify(nations);
        if !found.satisfies(deck.faction_rule) {
            return Err(ValidationError::FactionViolated {
                rule: deck.faction_rule,
                found,
            });
        }
    }
    Ok(())
}

pub fn can_add(unit: &Unit, deck: &Deck, ctx: &DeckContext<'_>) -> bool {
    check_add(unit, deck, ctx).is_ok()
}

pub fn add_unit(deck: &mut Deck, unit: &Unit, ctx: &DeckContext<'_>) -> Result<(), ValidationError> {
    check_add(unit, deck, ctx)?;
    deck.increment(&unit.id);
    Ok(())
}

/// Returns whether a copy was removed.
pub fn remove_unit(deck: &mut Deck, unit_id: &str) -> bool {
    let Some(idx) = deck.entries.iter().position(|e| e.unit_id == unit_id) else {
        return false;
    };
    let entry = &mut deck.entries[idx];
    entry.count = entry.count.saturating_sub(1);
    if entry.count == 0 {
        deck.entries.remove(idx);
    }
    true
}

/// Full re-check before a deck leaves the process.
pub fn validate_for_save(deck: &Deck, ctx: &DeckContext<'_>) -> Result<DeckTotals, ValidationError> {
    if deck.is_empty() {
        return Err(ValidationError::EmptyDeck);
    }
    for entry in deck.entries() {
        let Some(unit) = ctx.catalog.get(&entry.unit_id) else {
            return Err(ValidationError::UnknownUnit(entry.unit_id.clone()));
        };
        if let Some(cap) = ctx.copy_cap(&entry.unit_id)
            && entry.count > cap
        {
            return Err(ValidationError::CopyCapExceeded {
                unit: unit.name.clone(),
                cap,
            });
        }
    }

    let totals = compute_totals(deck, ctx.catalog, ctx.factions);
    if totals.points > deck.point_cap {
        return Err(ValidationError::PointCapExceeded {
            points: totals.points,
            cap: deck.point_cap,
        });
    }
    if !totals.faction.satisfies(deck.faction_rule) {
        return Err(ValidationError::FactionViolated {
            rule: deck.faction_rule,
            found: totals.faction,
        });
    }
    Ok(totals)
}

/// Payload handed to the deck persister.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckSubmission {
    pub name: String,
    pub point_cap: u32,
    pub faction_rule: FactionRule,
    pub total_points: u32,
    pub entries: Vec<DeckEntry>,
}

impl DeckSubmission {
    pub fn new(deck: &Deck, totals: &DeckTotals) -> Self {
        let name = deck.name.trim();
        Self {
            name: if name.is_empty() {
                DEFAULT_DECK_NAME.to_string()
            } else {
                name.to_string()
            },
            point_cap: deck.point_cap,
            faction_rule: deck.faction_rule,
            total_points: totals.points,
            entries: deck.entries().to_vec(),
        }
    }
}
