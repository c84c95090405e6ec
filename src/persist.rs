use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::FilterConfig;
use crate::cooldown::CooldownTimer;
use crate::deck::{Deck, snap_point_cap};
use crate::http_cache::app_cache_dir;
use crate::state::{AppState, Session};

const STATE_FILE: &str = "state.json";
const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StateFile {
    version: u32,
    #[serde(default)]
    cooldown_until_ms: i64,
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    filters: Option<FilterConfig>,
    #[serde(default)]
    deck: Option<Deck>,
}

pub fn state_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DECK_STATE_FILE")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    app_cache_dir().map(|dir| dir.join(STATE_FILE))
}

pub fn load_into_state(state: &mut AppState) {
    if let Some(path) = state_path() {
        load_from_path(state, &path);
    }
}

pub fn save_from_state(state: &AppState) {
    if let Some(path) = state_path() {
        save_to_path(state, &path);
    }
}

/// Restores what a previous run left behind. Unreadable or foreign-version files are ignored.
pub fn load_from_path(state: &mut AppState, path: &Path) -> bool {
    let Ok(raw) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(file) = serde_json::from_str::<StateFile>(&raw) else {
        return false;
    };
    if file.version != STATE_VERSION {
        return false;
    }

    state.cooldown = CooldownTimer::from_deadline(file.cooldown_until_ms);
    state.session = file.session;
    if let Some(filters) = file.filters {
        state.filters = filters;
    }
    if state.session.is_none() {
        state.filters.owned_only = false;
    }
    if let Some(mut deck) = file.deck {
        deck.point_cap = snap_point_cap(deck.point_cap);
        let entries = deck.entries().to_vec();
        deck.replace_entries(entries);
        state.deck = deck;
    }
    // The faction filter always mirrors the deck rule.
    state.filters.faction_rule = state.deck.faction_rule;
    true
}

pub fn save_to_path(state: &AppState, path: &Path) -> bool {
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let file = StateFile {
        version: STATE_VERSION,
        cooldown_until_ms: state.cooldown.until_ms(),
        session: state.session.clone(),
        filters: Some(state.filters.clone()),
        deck: Some(state.deck.clone()),
    };
    let Ok(json) = serde_json::to_string_pretty(&file) else {
        return false;
    };
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).is_ok() && fs::rename(&tmp, path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faction::FactionRule;

    #[test]
    fn deck_without_filters_restores_its_faction_filter() {
        let path = std::env::temp_dir()
            .join(format!("deck_persist_{}", std::process::id()))
            .join(STATE_FILE);
        let mut saved = AppState::new();
        saved.deck = Deck::new("Kursk", 100, FactionRule::AxisOnly);
        assert!(save_to_path(&saved, &path));

        let raw = fs::read_to_string(&path).expect("read");
        let mut json: serde_json::Value = serde_json::from_str(&raw).expect("json");
        json.as_object_mut().expect("object").remove("filters");
        fs::write(&path, json.to_string()).expect("write");

        let mut restored = AppState::new();
        assert_eq!(restored.filters.faction_rule, FactionRule::Mixed);
        assert!(load_from_path(&mut restored, &path));
        assert_eq!(restored.deck.faction_rule, FactionRule::AxisOnly);
        assert_eq!(restored.filters.faction_rule, FactionRule::AxisOnly);
        let _ = fs::remove_file(&path);
    }
}
