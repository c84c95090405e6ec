use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::catalog::{self, Catalog, FilterConfig, OwnershipMap, Unit, filter_units};
use crate::cooldown::CooldownTimer;
use crate::deck::{
    self, DEFAULT_POINT_CAP, Deck, DeckContext, DeckSubmission, next_point_cap, snap_point_cap,
};
use crate::error::{AppError, SignInFailure};
use crate::faction::{FactionTable, rule_label};
use crate::recommend::{RecommendConfig, recommend_into};
use crate::totals::{DeckTotals, compute_totals};

const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    pub access_token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Focus {
    Catalog,
    Deck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    Normal,
    Search,
    DeckName,
    Email,
    Code,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    pub catalog: Catalog,
    pub catalog_loading: bool,
    pub ownership: Option<OwnershipMap>,
    pub ownership_loading: bool,
    pub factions: FactionTable,
    pub filters: FilterConfig,
    pub deck: Deck,
    pub recommend: RecommendConfig,
    pub session: Option<Session>,
    pub pending_email: Option<String>,
    pub sign_in_pending: bool,
    pub cooldown: CooldownTimer,
    pub cooldown_remaining: u64,
    pub cooldown_ticking: bool,
    pub save_pending: bool,
    pub last_saved_id: Option<String>,
    pub status: Option<String>,
    pub focus: Focus,
    pub selected_unit: usize,
    pub selected_entry: usize,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub help_overlay: bool,
    pub logs: VecDeque<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// User intent, produced by the key handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetSearch(String),
    CycleNation,
    CycleType,
    CycleFactionRule,
    ToggleOwnedOnly,
    CyclePointCap,
    ToggleFocus,
    SelectNext,
    SelectPrev,
    AddSelected,
    RemoveSelected,
    AddUnit(String),
    RemoveUnit(String),
    Recommend,
    ResetDeck,
    RenameDeck(String),
    Save,
    RequestSignIn(String),
    VerifyCode(String),
    SignOut,
    ReloadCatalog,
    ToggleHelp,
}

/// Completion reported by a provider or the cooldown ticker.
#[derive(Debug, Clone)]
pub enum Delta {
    CatalogLoaded(Vec<Unit>),
    CatalogFailed(String),
    OwnershipLoaded {
        user_id: String,
        ownership: OwnershipMap,
    },
    OwnershipFailed(String),
    SignInRequested {
        email: String,
    },
    SignInFailed(SignInFailure),
    SignInUnavailable(String),
    SignedIn(Session),
    VerifyFailed(String),
    DeckSaved {
        id: String,
    },
    DeckSaveFailed(String),
    CooldownTick,
    Log(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCommand {
    FetchCatalog,
    FetchOwnership {
        session: Session,
    },
    RequestSignIn {
        email: String,
    },
    VerifySignIn {
        email: String,
        code: String,
    },
    SaveDeck {
        session: Session,
        submission: DeckSubmission,
    },
}

/// Side effects a transition asks the caller to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Provider(ProviderCommand),
    Persist,
    StartCooldownTicker,
    StopCooldownTicker,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::default(),
            catalog_loading: false,
            ownership: None,
            ownership_loading: false,
            factions: FactionTable::default(),
            filters: FilterConfig::default(),
            deck: Deck::default(),
            recommend: RecommendConfig::default(),
            session: None,
            pending_email: None,
            sign_in_pending: false,
            cooldown: CooldownTimer::default(),
            cooldown_remaining: 0,
            cooldown_ticking: false,
            save_pending: false,
            last_saved_id: None,
            status: None,
            focus: Focus::Catalog,
            selected_unit: 0,
            selected_entry: 0,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            help_overlay: false,
            logs: VecDeque::with_capacity(MAX_LOGS),
        }
    }

    pub fn with_point_cap(mut self, cap: u32) -> Self {
        self.deck.point_cap = snap_point_cap(cap);
        self
    }

    pub fn deck_context(&self) -> DeckContext<'_> {
        DeckContext {
            catalog: &self.catalog,
            ownership: self.ownership.as_ref(),
            enforce_ownership: self.filters.owned_only,
            factions: &self.factions,
        }
    }

    pub fn filtered_units(&self) -> Vec<&Unit> {
        filter_units(
            &self.catalog,
            &self.filters,
            self.ownership.as_ref(),
            &self.factions,
        )
    }

    pub fn totals(&self) -> DeckTotals {
        compute_totals(&self.deck, &self.catalog, &self.factions)
    }

    pub fn can_add_unit(&self, unit: &Unit) -> bool {
        deck::can_add(unit, &self.deck, &self.deck_context())
    }

    pub fn selected_unit(&self) -> Option<&Unit> {
        self.filtered_units().get(self.selected_unit).copied()
    }

    pub fn selected_entry_id(&self) -> Option<String> {
        self.deck
            .entries()
            .get(self.selected_entry)
            .map(|e| e.unit_id.clone())
    }

    pub fn can_request_sign_in(&self, now_ms: i64) -> bool {
        !self.sign_in_pending && self.cooldown.can_request(now_ms)
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some(msg.into());
    }

    pub fn report(&mut self, err: &AppError) {
        self.set_status(err.to_string());
    }

    pub fn clamp_selection(&mut self) {
        let units = self.filtered_units().len();
        self.selected_unit = self.selected_unit.min(units.saturating_sub(1));
        let entries = self.deck.entries().len();
        self.selected_entry = self.selected_entry.min(entries.saturating_sub(1));
    }

    fn select_next(&mut self) {
        match self.focus {
            Focus::Catalog => {
                let total = self.filtered_units().len();
                if self.selected_unit + 1 < total {
                    self.selected_unit += 1;
                }
            }
            Focus::Deck => {
                if self.selected_entry + 1 < self.deck.entries().len() {
                    self.selected_entry += 1;
                }
            }
        }
    }

    fn select_prev(&mut self) {
        match self.focus {
            Focus::Catalog => self.selected_unit = self.selected_unit.saturating_sub(1),
            Focus::Deck => self.selected_entry = self.selected_entry.saturating_sub(1),
        }
    }

    fn add_by_id(&mut self, unit_id: &str) -> Vec<Effect> {
        let result = {
            let ctx = DeckContext {
                catalog: &self.catalog,
                ownership: self.ownership.as_ref(),
                enforce_ownership: self.filters.owned_only,
                factions: &self.factions,
            };
            match self.catalog.get(unit_id) {
                Some(unit) => deck::add_unit(&mut self.deck, unit, &ctx).map(|_| unit.name.clone()),
                None => Err(crate::error::ValidationError::UnknownUnit(unit_id.to_string())),
            }
        };
        match result {
            Ok(name) => {
                self.status = None;
                self.push_log(format!("[INFO] Added {name}"));
                vec![Effect::Persist]
            }
            Err(err) => {
                self.report(&AppError::from(err));
                Vec::new()
            }
        }
    }

    fn remove_by_id(&mut self, unit_id: &str) -> Vec<Effect> {
        if !deck::remove_unit(&mut self.deck, unit_id) {
            return Vec::new();
        }
        self.clamp_selection();
        vec![Effect::Persist]
    }

    fn warn_on_drift(&mut self) {
        let checked = deck::validate_for_save(&self.deck, &self.deck_context());
        if let Err(err) = checked
            && !self.deck.is_empty()
        {
            self.push_log(format!("[WARN] Current deck no longer valid: {err}"));
        }
    }
}

/// Applies a user action. Returns the effects to schedule.
pub fn update(state: &mut AppState, action: Action, now_ms: i64) -> Vec<Effect> {
    match action {
        Action::SetSearch(text) => {
            state.filters.search_text = text;
            state.clamp_selection();
            Vec::new()
        }
        Action::CycleNation => {
            let options = catalog::nation_options(&state.catalog);
            state.filters.nation = catalog::cycle_option(&options, &state.filters.nation);
            state.clamp_selection();
            vec![Effect::Persist]
        }
        Action::CycleType => {
            let options = catalog::type_options(&state.catalog);
            state.filters.unit_type = catalog::cycle_option(&options, &state.filters.unit_type);
            state.clamp_selection();
            vec![Effect::Persist]
        }
        Action::CycleFactionRule => {
            let rule = state.deck.faction_rule.next();
            state.deck.faction_rule = rule;
            state.filters.faction_rule = rule;
            state.clamp_selection();
            state.push_log(format!("[INFO] Faction rule: {}", rule_label(rule)));
            state.warn_on_drift();
            vec![Effect::Persist]
        }
        Action::ToggleOwnedOnly => {
            if !state.filters.owned_only && state.session.is_none() {
                state.report(&AppError::AuthenticationRequired("filter by owned units"));
                return Vec::new();
            }
            state.filters.owned_only = !state.filters.owned_only;
            state.clamp_selection();
            state.warn_on_drift();
            vec![Effect::Persist]
        }
        Action::CyclePointCap => {
            state.deck.point_cap = next_point_cap(state.deck.point_cap);
            state.push_log(format!("[INFO] Point cap: {}", state.deck.point_cap));
            state.warn_on_drift();
            vec![Effect::Persist]
        }
        Action::ToggleFocus => {
            state.focus = match state.focus {
                Focus::Catalog => Focus::Deck,
                Focus::Deck => Focus::Catalog,
            };
            state.clamp_selection();
            Vec::new()
        }
        Action::SelectNext => {
            state.select_next();
            Vec::new()
        }
        Action::SelectPrev => {
            state.select_prev();
            Vec::new()
        }
        Action::AddSelected => {
            let id = match state.focus {
                Focus::Catalog => state.selected_unit().map(|u| u.id.clone()),
                Focus::Deck => state.selected_entry_id(),
            };
            match id {
                Some(id) => state.add_by_id(&id),
                None => Vec::new(),
            }
        }
        Action::RemoveSelected => {
            let id = match state.focus {
                Focus::Catalog => state.selected_unit().map(|u| u.id.clone()),
                Focus::Deck => state.selected_entry_id(),
            };
            match id {
                Some(id) => state.remove_by_id(&id),
                None => Vec::new(),
            }
        }
        Action::AddUnit(id) => state.add_by_id(&id),
        Action::RemoveUnit(id) => state.remove_by_id(&id),
        Action::Recommend => {
            if state.catalog.is_empty() {
                state.set_status("Catalog not loaded yet");
                return Vec::new();
            }
            let mut deck = state.deck.clone();
            let spent = {
                let candidates = state.filtered_units();
                recommend_into(&mut deck, &candidates, &state.deck_context(), state.recommend)
            };
            state.deck = deck;
            state.selected_entry = 0;
            state.push_log(format!(
                "[INFO] Recommended {} units for {spent}/{} points",
                state.deck.entries().len(),
                state.deck.point_cap
            ));
            state.status = None;
            vec![Effect::Persist]
        }
        Action::ResetDeck => {
            state.deck.clear();
            state.selected_entry = 0;
            state.push_log("[INFO] Deck reset");
            vec![Effect::Persist]
        }
        Action::RenameDeck(name) => {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            state.deck.name = trimmed.to_string();
            vec![Effect::Persist]
        }
        Action::Save => {
            let Some(session) = state.session.clone() else {
                state.report(&AppError::AuthenticationRequired("save decks"));
                return Vec::new();
            };
            let checked = deck::validate_for_save(&state.deck, &state.deck_context());
            let totals = match checked {
                Ok(totals) => totals,
                Err(err) => {
                    state.push_log(format!("[WARN] Save rejected: {err}"));
                    state.report(&AppError::from(err));
                    return Vec::new();
                }
            };
            let submission = DeckSubmission::new(&state.deck, &totals);
            state.save_pending = true;
            state.set_status("Saving deck...");
            vec![Effect::Provider(ProviderCommand::SaveDeck {
                session,
                submission,
            })]
        }
        Action::RequestSignIn(email) => {
            let email = email.trim().to_string();
            if !email.contains('@') {
                state.set_status("Enter a valid email address");
                return Vec::new();
            }
            let remaining = state.cooldown.remaining_secs(now_ms);
            if remaining > 0 {
                state.cooldown_remaining = remaining;
                state.report(&AppError::RateLimited {
                    wait_secs: remaining,
                });
                if state.cooldown_ticking {
                    return Vec::new();
                }
                state.cooldown_ticking = true;
                return vec![Effect::StartCooldownTicker];
            }
            state.sign_in_pending = true;
            state.pending_email = Some(email.clone());
            state.set_status(format!("Requesting sign-in code for {email}..."));
            vec![Effect::Provider(ProviderCommand::RequestSignIn { email })]
        }
        Action::VerifyCode(code) => {
            let code = code.trim().to_string();
            let Some(email) = state.pending_email.clone() else {
                state.set_status("Request a sign-in code first");
                return Vec::new();
            };
            if code.is_empty() {
                return Vec::new();
            }
            state.set_status("Verifying code...");
            vec![Effect::Provider(ProviderCommand::VerifySignIn { email, code })]
        }
        Action::SignOut => {
            if state.session.take().is_none() {
                return Vec::new();
            }
            state.ownership = None;
            state.pending_email = None;
            state.filters.owned_only = false;
            state.clamp_selection();
            state.push_log("[INFO] Signed out");
            state.set_status("Signed out");
            let mut effects = vec![Effect::Persist];
            // The deadline is kept; the next sign-in request re-arms the ticker.
            if state.cooldown_ticking {
                state.cooldown_ticking = false;
                effects.push(Effect::StopCooldownTicker);
            }
            effects
        }
        Action::ReloadCatalog => {
            state.catalog_loading = true;
            let mut effects = vec![Effect::Provider(ProviderCommand::FetchCatalog)];
            if let Some(session) = state.session.clone() {
                state.ownership_loading = true;
                effects.push(Effect::Provider(ProviderCommand::FetchOwnership { session }));
            }
            effects
        }
        Action::ToggleHelp => {
            state.help_overlay = !state.help_overlay;
            Vec::new()
        }
    }
}

/// Applies a provider completion. Later completions overwrite earlier ones.
pub fn apply_delta(state: &mut AppState, delta: Delta, now_ms: i64) -> Vec<Effect> {
    match delta {
        Delta::CatalogLoaded(units) => {
            state.push_log(format!("[INFO] Catalog loaded: {} units", units.len()));
            state.catalog = Catalog::from(units);
            state.catalog_loading = false;
            state.clamp_selection();
            Vec::new()
        }
        Delta::CatalogFailed(err) => {
            state.catalog_loading = false;
            state.push_log(format!("[ERR] Catalog fetch failed: {err}"));
            state.report(&AppError::transport("load the unit catalog"));
            Vec::new()
        }
        Delta::OwnershipLoaded { user_id, ownership } => {
            state.ownership_loading = false;
            let current = state.session.as_ref().map(|s| s.user_id.as_str());
            if current != Some(user_id.as_str()) {
                state.push_log("[INFO] Dropped ownership for a previous session");
                return Vec::new();
            }
            state.push_log(format!("[INFO] Ownership loaded: {} records", ownership.len()));
            state.ownership = Some(ownership);
            state.clamp_selection();
            Vec::new()
        }
        Delta::OwnershipFailed(err) => {
            state.ownership_loading = false;
            state.push_log(format!("[ERR] Ownership fetch failed: {err}"));
            state.report(&AppError::transport("load your collection"));
            Vec::new()
        }
        Delta::SignInRequested { email } => {
            state.sign_in_pending = false;
            state.push_log(format!("[INFO] Sign-in code sent to {email}"));
            state.set_status(format!("Check {email} for your sign-in code, then press v"));
            Vec::new()
        }
        Delta::SignInFailed(failure) => {
            state.sign_in_pending = false;
            if !failure.is_rate_limited() {
                state.push_log(format!("[WARN] Sign-in rejected (status {})", failure.status));
                state.set_status("Sign-in request failed. Please try again.");
                return Vec::new();
            }
            let wait_secs = state.cooldown.on_rate_limited(&failure.message, now_ms);
            state.cooldown_remaining = state.cooldown.remaining_secs(now_ms);
            state.push_log(format!(
                "[WARN] Sign-in rate limited (status {}), waiting {wait_secs}s",
                failure.status
            ));
            state.report(&AppError::RateLimited { wait_secs });
            let mut effects = vec![Effect::Persist];
            if !state.cooldown_ticking && state.cooldown_remaining > 0 {
                state.cooldown_ticking = true;
                effects.push(Effect::StartCooldownTicker);
            }
            effects
        }
        Delta::SignInUnavailable(err) => {
            state.sign_in_pending = false;
            state.push_log(format!("[ERR] Sign-in request failed: {err}"));
            state.report(&AppError::transport("reach the sign-in service"));
            Vec::new()
        }
        Delta::SignedIn(session) => {
            state.push_log(format!("[INFO] Signed in as {}", session.email));
            state.set_status(format!("Signed in as {}", session.email));
            state.pending_email = None;
            state.session = Some(session.clone());
            state.ownership_loading = true;
            vec![
                Effect::Persist,
                Effect::Provider(ProviderCommand::FetchOwnership { session }),
            ]
        }
        Delta::VerifyFailed(err) => {
            state.push_log(format!("[WARN] Code verification failed: {err}"));
            state.set_status("That code did not work. Request a new one or try again.");
            Vec::new()
        }
        Delta::DeckSaved { id } => {
            state.save_pending = false;
            state.push_log(format!("[INFO] Deck saved as {id}"));
            state.set_status(format!("Deck \"{}\" saved", state.deck.name));
            state.last_saved_id = Some(id);
            vec![Effect::Persist]
        }
        Delta::DeckSaveFailed(err) => {
            state.save_pending = false;
            state.push_log(format!("[ERR] Deck save failed: {err}"));
            state.report(&AppError::transport("save the deck"));
            Vec::new()
        }
        Delta::CooldownTick => {
            state.cooldown_remaining = state.cooldown.remaining_secs(now_ms);
            if state.cooldown_remaining == 0 && state.cooldown_ticking {
                state.cooldown_ticking = false;
                state.push_log("[INFO] Sign-in available again");
                return vec![Effect::StopCooldownTicker];
            }
            Vec::new()
        }
        Delta::Log(msg) => {
            state.push_log(msg);
            Vec::new()
        }
    }
}

/// Effects to run once persisted state has been restored at process start.
pub fn startup_effects(state: &mut AppState, now_ms: i64) -> Vec<Effect> {
    let mut effects = Vec::new();
    state.cooldown_remaining = state.cooldown.remaining_secs(now_ms);
    state.cooldown_ticking = false;
    if state.cooldown_remaining > 0 {
        state.cooldown_ticking = true;
        state.push_log(format!(
            "[INFO] Sign-in cooldown active: {}s remaining",
            state.cooldown_remaining
        ));
        effects.push(Effect::StartCooldownTicker);
    }
    effects.extend(update(state, Action::ReloadCatalog, now_ms));
    effects
}

pub fn default_state(cap: Option<u32>) -> AppState {
    AppState::new().with_point_cap(cap.unwrap_or(DEFAULT_POINT_CAP))
}

pub fn focus_label(focus: Focus) -> &'static str {
    match focus {
        Focus::Catalog => "Catalog",
        Focus::Deck => "Deck",
    }
}
