use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    Axis,
    Allies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactionRule {
    AxisOnly,
    AlliesOnly,
    Mixed,
}

impl FactionRule {
    /// The single side a deck must belong to, `None` for mixed decks.
    pub fn required_faction(self) -> Option<Faction> {
        match self {
            FactionRule::AxisOnly => Some(Faction::Axis),
            FactionRule::AlliesOnly => Some(Faction::Allies),
            FactionRule::Mixed => None,
        }
    }

    /// Wire and storage spelling.
    pub fn key(self) -> &'static str {
        match self {
            FactionRule::AxisOnly => "axis_only",
            FactionRule::AlliesOnly => "allies_only",
            FactionRule::Mixed => "mixed",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim() {
            "axis_only" => Some(FactionRule::AxisOnly),
            "allies_only" => Some(FactionRule::AlliesOnly),
            "mixed" => Some(FactionRule::Mixed),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            FactionRule::Mixed => FactionRule::AxisOnly,
            FactionRule::AxisOnly => FactionRule::AlliesOnly,
            FactionRule::AlliesOnly => FactionRule::Mixed,
        }
    }
}

/// Classification of a whole deck by the nations it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeckFaction {
    Empty,
    Axis,
    Allies,
    Mixed,
}

impl DeckFaction {
    /// An empty deck satisfies every rule.
    pub fn satisfies(self, rule: FactionRule) -> bool {
        match (self, rule.required_faction()) {
            (_, None) | (DeckFaction::Empty, _) => true,
            (DeckFaction::Axis, Some(Faction::Axis)) => true,
            (DeckFaction::Allies, Some(Faction::Allies)) => true,
            _ => false,
        }
    }
}

const DEFAULT_AXIS_NATIONS: &[&str] = &[
    "Germany", "Italy", "Japan", "Hungary", "Romania", "Finland", "Bulgaria", "Slovakia",
];

const DEFAULT_ALLIES_NATIONS: &[&str] = &[
    "United States",
    "USA",
    "United Kingdom",
    "UK",
    "Britain",
    "Commonwealth",
    "Soviet Union",
    "USSR",
    "France",
    "Free France",
    "Poland",
    "China",
    "Canada",
    "Australia",
    "New Zealand",
    "Netherlands",
    "Greece",
    "Yugoslavia",
];

/// Nation to faction lookup. Nations missing from the table belong to neither side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionTable {
    nations: HashMap<String, Faction>,
}

#[derive(Debug, Deserialize)]
struct FactionFile {
    #[serde(default)]
    axis: Vec<String>,
    #[serde(default)]
    allies: Vec<String>,
}

impl Default for FactionTable {
    fn default() -> Self {
        Self::from_sets(DEFAULT_AXIS_NATIONS, DEFAULT_ALLIES_NATIONS)
    }
}

impl FactionTable {
    pub fn from_sets<S: AsRef<str>>(axis: &[S], allies: &[S]) -> Self {
        let mut nations = HashMap::with_capacity(axis.len() + allies.len());
        for nation in axis {
            nations.insert(nation.as_ref().to_string(), Faction::Axis);
        }
        for nation in allies {
            nations.insert(nation.as_ref().to_string(), Faction::Allies);
        }
        Self { nations }
    }

    /// Loads `{"axis": [...], "allies": [...]}` from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read faction table {}", path.display()))?;
        let file: FactionFile = serde_json::from_str(&raw).context("invalid faction table json")?;
        Ok(Self::from_sets(&file.axis[..], &file.allies[..]))
    }

    pub fn faction_of(&self, nation: &str) -> Option<Faction> {
        self.nations.get(nation).copied()
    }

    pub fn insert(&mut self, nation: impl Into<String>, faction: Faction) {
        self.nations.insert(nation.into(), faction);
    }

    pub fn is_member(&self, nation: &str, faction: Faction) -> bool {
        self.faction_of(nation) == Some(faction)
    }

    /// Classifies a set of nations; any nation outside both sides makes it mixed.
    pub fn classify<'a, I>(&self, nations: I) -> DeckFaction
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = DeckFaction::Empty;
        for nation in nations {
            let side = match self.faction_of(nation) {
                Some(Faction::Axis) => DeckFaction::Axis,
                Some(Faction::Allies) => DeckFaction::Allies,
                None => return DeckFaction::Mixed,
            };
            out = match out {
                DeckFaction::Empty => side,
                current if current == side => current,
                _ => return DeckFaction::Mixed,
            };
        }
        out
    }
}

pub fn faction_label(faction: DeckFaction) -> &'static str {
    match faction {
        DeckFaction::Empty => "-",
        DeckFaction::Axis => "Axis",
        DeckFaction::Allies => "Allies",
        DeckFaction::Mixed => "Mixed",
    }
}

pub fn rule_label(rule: FactionRule) -> &'static str {
    match rule {
        FactionRule::AxisOnly => "Axis only",
        FactionRule::AlliesOnly => "Allies only",
        FactionRule::Mixed => "Mixed",
    }
}

impl fmt::Display for FactionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(rule_label(*self))
    }
}

impl fmt::Display for DeckFaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(faction_label(*self))
    }
}
