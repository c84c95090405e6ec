use deck_terminal::catalog::{OwnershipMap, OwnershipRecord};
use deck_terminal::demo::{DemoBackend, seed_catalog};
use deck_terminal::faction::FactionRule;
use deck_terminal::state::{
    Action, AppState, Delta, Effect, Focus, ProviderCommand, Session, apply_delta, update,
};
use deck_terminal::store;
use deck_terminal::worker::run_command;

const NOW: i64 = 1_700_000_000_000;

fn session() -> Session {
    Session {
        email: "cmdr@example.com".to_string(),
        access_token: "token".to_string(),
        user_id: "user-1".to_string(),
    }
}

fn loaded_state() -> AppState {
    let mut state = AppState::new();
    apply_delta(&mut state, Delta::CatalogLoaded(seed_catalog()), NOW);
    state
}

fn signed_in_state() -> AppState {
    let mut state = loaded_state();
    apply_delta(&mut state, Delta::SignedIn(session()), NOW);
    state
}

#[test]
fn reload_fetches_catalog_and_ownership_when_signed_in() {
    let mut state = AppState::new();
    let effects = update(&mut state, Action::ReloadCatalog, NOW);
    assert_eq!(effects, vec![Effect::Provider(ProviderCommand::FetchCatalog)]);
    assert!(state.catalog_loading);

    state.session = Some(session());
    let effects = update(&mut state, Action::ReloadCatalog, NOW);
    assert_eq!(effects.len(), 2);
    assert!(state.ownership_loading);
}

#[test]
fn save_and_owned_filter_need_a_session() {
    let mut state = loaded_state();
    update(&mut state, Action::AddUnit("us-sherman".to_string()), NOW);

    assert!(update(&mut state, Action::Save, NOW).is_empty());
    assert_eq!(state.status.as_deref(), Some("Sign in to save decks"));

    assert!(update(&mut state, Action::ToggleOwnedOnly, NOW).is_empty());
    assert!(!state.filters.owned_only);
    assert_eq!(state.status.as_deref(), Some("Sign in to filter by owned units"));
}

#[test]
fn save_emits_submission_for_valid_deck() {
    let mut state = signed_in_state();
    update(&mut state, Action::RenameDeck("  Bastogne ".to_string()), NOW);
    update(&mut state, Action::AddUnit("us-sherman".to_string()), NOW);
    update(&mut state, Action::AddUnit("us-rifleman".to_string()), NOW);

    let effects = update(&mut state, Action::Save, NOW);
    assert!(state.save_pending);
    let [Effect::Provider(ProviderCommand::SaveDeck { session, submission })] = effects.as_slice()
    else {
        panic!("expected a save command, got {effects:?}");
    };
    assert_eq!(session.user_id, "user-1");
    assert_eq!(submission.name, "Bastogne");
    assert_eq!(submission.total_points, 28);
    assert_eq!(submission.entries.len(), 2);

    apply_delta(
        &mut state,
        Delta::DeckSaved {
            id: "deck-7".to_string(),
        },
        NOW,
    );
    assert!(!state.save_pending);
    assert_eq!(state.last_saved_id.as_deref(), Some("deck-7"));
}

#[test]
fn empty_deck_save_is_rejected_locally() {
    let mut state = signed_in_state();
    assert!(update(&mut state, Action::Save, NOW).is_empty());
    assert_eq!(state.status.as_deref(), Some("Deck is empty"));
}

#[test]
fn faction_rule_cycles_deck_and_filter_together() {
    let mut state = loaded_state();
    update(&mut state, Action::CycleFactionRule, NOW);
    assert_eq!(state.deck.faction_rule, FactionRule::AxisOnly);
    assert_eq!(state.filters.faction_rule, FactionRule::AxisOnly);
    assert!(
        state
            .filtered_units()
            .iter()
            .all(|u| state.factions.is_member(&u.nation, deck_terminal::faction::Faction::Axis))
    );

    let rejected = update(&mut state, Action::AddUnit("sov-t34".to_string()), NOW);
    assert!(rejected.is_empty());
    assert!(state.deck.is_empty());
}

#[test]
fn selection_add_and_remove_follow_focus() {
    let mut state = loaded_state();
    update(&mut state, Action::SelectNext, NOW);
    let selected = state.selected_unit().map(|u| u.id.clone()).expect("selection");
    update(&mut state, Action::AddSelected, NOW);
    update(&mut state, Action::AddSelected, NOW);
    assert_eq!(state.deck.count_of(&selected), 2);

    update(&mut state, Action::ToggleFocus, NOW);
    assert_eq!(state.focus, Focus::Deck);
    update(&mut state, Action::RemoveSelected, NOW);
    assert_eq!(state.deck.count_of(&selected), 1);
    update(&mut state, Action::RemoveSelected, NOW);
    assert!(state.deck.is_empty());
}

#[test]
fn recommend_fills_deck_within_cap() {
    let mut state = loaded_state();
    let effects = update(&mut state, Action::Recommend, NOW);
    assert_eq!(effects, vec![Effect::Persist]);
    let totals = state.totals();
    assert!(totals.points <= state.deck.point_cap);
    assert!(totals.points > 0);
    assert!(totals.unit_count > 0);
}

#[test]
fn sign_in_request_is_blocked_during_cooldown() {
    let mut state = loaded_state();
    assert!(update(&mut state, Action::RequestSignIn("not-an-email".to_string()), NOW).is_empty());

    let effects = update(&mut state, Action::RequestSignIn("a@b.co".to_string()), NOW);
    assert_eq!(
        effects,
        vec![Effect::Provider(ProviderCommand::RequestSignIn {
            email: "a@b.co".to_string()
        })]
    );
    state.cooldown = deck_terminal::cooldown::CooldownTimer::from_deadline(NOW + 10_000);
    state.sign_in_pending = false;
    let effects = update(&mut state, Action::RequestSignIn("a@b.co".to_string()), NOW);
    assert_eq!(effects, vec![Effect::StartCooldownTicker]);
    assert_eq!(state.cooldown_remaining, 10);
    assert_eq!(
        state.status.as_deref(),
        Some("Too many sign-in requests. Try again in 10 seconds.")
    );
    // Already ticking: no second ticker.
    assert!(update(&mut state, Action::RequestSignIn("a@b.co".to_string()), NOW).is_empty());
}

#[test]
fn ownership_for_previous_session_is_dropped() {
    let mut state = signed_in_state();
    let mut ownership = OwnershipMap::new();
    ownership.insert(
        "ger-tiger-i".to_string(),
        OwnershipRecord {
            owned: true,
            copies: 1,
        },
    );
    apply_delta(
        &mut state,
        Delta::OwnershipLoaded {
            user_id: "someone-else".to_string(),
            ownership: ownership.clone(),
        },
        NOW,
    );
    assert!(state.ownership.is_none());

    apply_delta(
        &mut state,
        Delta::OwnershipLoaded {
            user_id: "user-1".to_string(),
            ownership,
        },
        NOW,
    );
    assert_eq!(state.ownership.as_ref().map(|m| m.len()), Some(1));

    update(&mut state, Action::SignOut, NOW);
    assert!(state.session.is_none());
    assert!(state.ownership.is_none());
}

#[test]
fn transport_failures_keep_previous_values() {
    let mut state = loaded_state();
    let before = state.catalog.len();
    apply_delta(&mut state, Delta::CatalogFailed("timeout".to_string()), NOW);
    assert_eq!(state.catalog.len(), before);
    assert_eq!(
        state.status.as_deref(),
        Some("Could not load the unit catalog. Please try again.")
    );
    assert!(state.logs.iter().any(|l| l.contains("timeout")));
}

#[test]
fn demo_backend_round_trip_through_worker() {
    let mut backend = DemoBackend::new(None, 60).expect("demo backend");
    let mut state = AppState::new();

    for delta in run_command(&mut backend, ProviderCommand::FetchCatalog) {
        apply_delta(&mut state, delta, NOW);
    }
    assert!(!state.catalog.is_empty());

    let deltas = run_command(
        &mut backend,
        ProviderCommand::RequestSignIn {
            email: "a@b.co".to_string(),
        },
    );
    assert!(matches!(deltas.as_slice(), [Delta::SignInRequested { .. }]));
    let deltas = run_command(
        &mut backend,
        ProviderCommand::RequestSignIn {
            email: "a@b.co".to_string(),
        },
    );
    let [Delta::SignInFailed(failure)] = deltas.as_slice() else {
        panic!("expected rate limit, got {deltas:?}");
    };
    assert!(failure.is_rate_limited());

    let deltas = run_command(
        &mut backend,
        ProviderCommand::VerifySignIn {
            email: "a@b.co".to_string(),
            code: "123456".to_string(),
        },
    );
    for delta in deltas {
        for effect in apply_delta(&mut state, delta, NOW) {
            if let Effect::Provider(cmd) = effect {
                for delta in run_command(&mut backend, cmd) {
                    apply_delta(&mut state, delta, NOW);
                }
            }
        }
    }
    assert!(state.session.is_some());
    assert!(state.ownership.is_some());

    update(&mut state, Action::Recommend, NOW);
    let effects = update(&mut state, Action::Save, NOW);
    let Some(Effect::Provider(cmd)) = effects.into_iter().next() else {
        panic!("expected save command");
    };
    for delta in run_command(&mut backend, cmd) {
        apply_delta(&mut state, delta, NOW);
    }
    let id = state.last_saved_id.clone().expect("saved id");
    let stored = store::load_deck(backend.connection(), &id)
        .expect("load")
        .expect("stored deck");
    assert_eq!(stored.entries, state.deck.entries());
}
