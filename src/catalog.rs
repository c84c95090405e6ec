use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::faction::{FactionRule, FactionTable};

pub const ALL: &str = "All";
pub const RANGE_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub nation: String,
    #[serde(rename = "type")]
    pub unit_type: String,
    #[serde(default)]
    pub year: Option<i32>,
    pub points: u32,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub abilities: String,
    // Range index (0..=3) to effective damage.
    #[serde(default)]
    pub stats: BTreeMap<u8, f64>,
}

impl Unit {
    pub fn effective(&self, range: u8) -> f64 {
        self.stats.get(&range).copied().unwrap_or(0.0)
    }

    pub fn effective_total(&self) -> f64 {
        (0..RANGE_COUNT as u8).map(|r| self.effective(r)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub owned: bool,
    pub copies: u32,
}

impl OwnershipRecord {
    pub fn is_owned(&self) -> bool {
        self.owned || self.copies > 0
    }
}

pub type OwnershipMap = HashMap<String, OwnershipRecord>;

/// Ordered unit list with an id index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Unit>", into = "Vec<Unit>")]
pub struct Catalog {
    units: Vec<Unit>,
    index: HashMap<String, usize>,
}

impl From<Vec<Unit>> for Catalog {
    fn from(units: Vec<Unit>) -> Self {
        let mut index = HashMap::with_capacity(units.len());
        for (idx, unit) in units.iter().enumerate() {
            // First occurrence wins on duplicate ids.
            index.entry(unit.id.clone()).or_insert(idx);
        }
        Self { units, index }
    }
}

impl From<Catalog> for Vec<Unit> {
    fn from(catalog: Catalog) -> Self {
        catalog.units
    }
}

impl Catalog {
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn get(&self, id: &str) -> Option<&Unit> {
        self.index.get(id).and_then(|idx| self.units.get(*idx))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub search_text: String,
    pub nation: String,
    pub unit_type: String,
    pub faction_rule: FactionRule,
    pub owned_only: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            nation: ALL.to_string(),
            unit_type: ALL.to_string(),
            faction_rule: FactionRule::Mixed,
            owned_only: false,
        }
    }
}

/// Narrows the catalog stage by stage; catalog order is preserved.
pub fn filter_units<'a>(
    catalog: &'a Catalog,
    filters: &FilterConfig,
    ownership: Option<&OwnershipMap>,
    factions: &FactionTable,
) -> Vec<&'a Unit> {
    let needle = filters.search_text.as_str();
    let blank = needle.trim().is_empty();
    let required = filters.faction_rule.required_faction();
    catalog
        .units()
        .iter()
        .filter(|u| {
            blank
                || contains_ci(&u.name, needle)
                || contains_ci(&u.abilities, needle)
        })
        .filter(|u| filters.nation == ALL || u.nation == filters.nation)
        .filter(|u| filters.unit_type == ALL || u.unit_type == filters.unit_type)
        .filter(|u| required.is_none_or(|f| factions.is_member(&u.nation, f)))
        .filter(|u| {
            !filters.owned_only
                || ownership
                    .and_then(|map| map.get(&u.id))
                    .is_some_and(OwnershipRecord::is_owned)
        })
        .collect()
}

pub fn nation_options(catalog: &Catalog) -> Vec<String> {
    distinct_with_all(catalog.units().iter().map(|u| u.nation.as_str()))
}

pub fn type_options(catalog: &Catalog) -> Vec<String> {
    distinct_with_all(catalog.units().iter().map(|u| u.unit_type.as_str()))
}

/// Value after `current` in `options`, wrapping; unknown values restart at the head.
pub fn cycle_option(options: &[String], current: &str) -> String {
    let next = options
        .iter()
        .position(|o| o == current)
        .map(|idx| (idx + 1) % options.len().max(1))
        .unwrap_or(0);
    options
        .get(next)
        .cloned()
        .unwrap_or_else(|| ALL.to_string())
}

fn distinct_with_all<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = vec![ALL.to_string()];
    for value in values {
        if value.is_empty() || value == ALL {
            continue;
        }
        if seen.insert(value) {
            out.push(value.to_string());
        }
    }
    out
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
