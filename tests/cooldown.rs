use std::path::PathBuf;

use deck_terminal::cooldown::{CooldownState, CooldownTimer, FALLBACK_WAIT_SECS, parse_wait_seconds};
use deck_terminal::error::SignInFailure;
use deck_terminal::persist::{load_from_path, save_to_path};
use deck_terminal::state::{
    Action, AppState, Delta, Effect, Session, apply_delta, startup_effects, update,
};

const T0: i64 = 1_700_000_000_000;

fn temp_state_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("deck_terminal_test_{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    dir.join(name)
}

fn rate_limited(message: &str) -> SignInFailure {
    SignInFailure {
        status: 429,
        rate_limit_code: Some("over_email_send_rate_limit".to_string()),
        message: message.to_string(),
    }
}

#[test]
fn wait_extraction() {
    assert_eq!(
        parse_wait_seconds("For security purposes, you can only request this after 54 seconds."),
        54
    );
    assert_eq!(parse_wait_seconds("Please retry after 1 minute."), 60);
    assert_eq!(parse_wait_seconds("try again in 3 mins"), 180);
    assert_eq!(parse_wait_seconds(""), FALLBACK_WAIT_SECS);
    assert_eq!(parse_wait_seconds("email rate limit exceeded"), FALLBACK_WAIT_SECS);
}

#[test]
fn timer_counts_down_and_releases() {
    let mut timer = CooldownTimer::default();
    assert_eq!(timer.state(T0), CooldownState::Idle);
    assert!(timer.can_request(T0));

    let wait = timer.on_rate_limited("only request this after 54 seconds.", T0);
    assert_eq!(wait, 54);
    assert_eq!(timer.state(T0), CooldownState::Waiting { until_ms: T0 + 54_000 });
    assert_eq!(timer.remaining_secs(T0), 54);
    assert!(!timer.can_request(T0 + 53_999));
    assert_eq!(timer.remaining_secs(T0 + 54_000), 0);
    assert!(timer.can_request(T0 + 54_000));
    assert_eq!(timer.state(T0 + 60_000), CooldownState::Idle);
}

#[test]
fn later_rate_limit_overwrites_deadline() {
    let mut timer = CooldownTimer::default();
    timer.on_rate_limited("after 54 seconds", T0);
    timer.on_rate_limited("after 5 seconds", T0 + 1_000);
    assert_eq!(timer.until_ms(), T0 + 6_000);
}

#[test]
fn rate_limited_sign_in_survives_reload() {
    let path = temp_state_file("cooldown_reload.json");
    let mut state = AppState::new();
    let effects = apply_delta(
        &mut state,
        Delta::SignInFailed(rate_limited(
            "For security purposes, you can only request this after 54 seconds.",
        )),
        T0,
    );
    assert!(effects.contains(&Effect::Persist));
    assert!(effects.contains(&Effect::StartCooldownTicker));
    assert_eq!(state.cooldown_remaining, 54);
    assert_eq!(
        state.status.as_deref(),
        Some("Too many sign-in requests. Try again in 54 seconds.")
    );
    assert!(save_to_path(&state, &path));

    let mut reloaded = AppState::new();
    assert!(load_from_path(&mut reloaded, &path));
    let effects = startup_effects(&mut reloaded, T0 + 30_000);
    assert_eq!(reloaded.cooldown_remaining, 24);
    assert!(reloaded.cooldown_ticking);
    assert_eq!(effects.first(), Some(&Effect::StartCooldownTicker));
    assert!(!reloaded.can_request_sign_in(T0 + 30_000));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn ticks_stop_the_ticker_at_zero() {
    let mut state = AppState::new();
    apply_delta(
        &mut state,
        Delta::SignInFailed(rate_limited("after 2 seconds")),
        T0,
    );
    assert!(state.cooldown_ticking);

    let effects = apply_delta(&mut state, Delta::CooldownTick, T0 + 1_000);
    assert!(effects.is_empty());
    assert_eq!(state.cooldown_remaining, 1);

    let effects = apply_delta(&mut state, Delta::CooldownTick, T0 + 2_000);
    assert_eq!(effects, vec![Effect::StopCooldownTicker]);
    assert_eq!(state.cooldown_remaining, 0);
    assert!(!state.cooldown_ticking);
    assert!(state.can_request_sign_in(T0 + 2_000));
}

#[test]
fn non_rate_limit_failure_leaves_timer_idle() {
    let mut state = AppState::new();
    let effects = apply_delta(
        &mut state,
        Delta::SignInFailed(SignInFailure {
            status: 500,
            rate_limit_code: None,
            message: "upstream exploded: stack trace ...".to_string(),
        }),
        T0,
    );
    assert!(effects.is_empty());
    assert_eq!(state.cooldown.until_ms(), 0);
    let status = state.status.clone().unwrap_or_default();
    assert!(!status.contains("stack trace"));
}

#[test]
fn sign_out_stops_the_ticker_but_keeps_the_deadline() {
    let mut state = AppState::new();
    state.session = Some(Session {
        email: "cmdr@example.com".to_string(),
        access_token: "token".to_string(),
        user_id: "user-1".to_string(),
    });
    apply_delta(
        &mut state,
        Delta::SignInFailed(rate_limited("only request this after 54 seconds.")),
        T0,
    );
    assert!(state.cooldown_ticking);

    let effects = update(&mut state, Action::SignOut, T0 + 1_000);
    assert_eq!(effects, vec![Effect::Persist, Effect::StopCooldownTicker]);
    assert!(!state.cooldown_ticking);
    assert!(state.session.is_none());
    assert_eq!(state.cooldown.until_ms(), T0 + 54_000);

    let effects = update(
        &mut state,
        Action::RequestSignIn("cmdr@example.com".to_string()),
        T0 + 4_000,
    );
    assert_eq!(effects, vec![Effect::StartCooldownTicker]);
    assert!(state.cooldown_ticking);
    assert_eq!(state.cooldown_remaining, 50);
}
