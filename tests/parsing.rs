use std::fs;
use std::path::PathBuf;

use deck_terminal::backend::{
    parse_catalog_json, parse_inserted_id, parse_ownership_json, parse_session_json,
    parse_sign_in_failure,
};
use deck_terminal::cooldown::parse_wait_seconds;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_catalog_fixture() {
    let raw = read_fixture("catalog.json");
    let units = parse_catalog_json(&raw).expect("fixture should parse");
    assert_eq!(units.len(), 3);

    let tiger = &units[0];
    assert_eq!(tiger.id, "ger-tiger-i");
    assert_eq!(tiger.unit_type, "Vehicle");
    assert_eq!(tiger.year, Some(1942));
    assert_eq!(tiger.points, 45);
    assert_eq!(tiger.effective(2), 12.5);
    assert_eq!(tiger.effective_total(), 50.5);

    let guards = &units[1];
    assert_eq!(guards.id, "17");
    assert_eq!(guards.nation, "Soviet Union");
    assert_eq!(guards.unit_type, "Soldier");
    assert_eq!(guards.points, 6);
    assert_eq!(guards.effective(3), 0.0);
    assert_eq!(guards.effective_total(), 11.0);

    assert_eq!(units[2].points, 0);
    assert!(units[2].stats.is_empty());
}

#[test]
fn empty_catalog_bodies_are_empty() {
    assert!(parse_catalog_json("").expect("empty").is_empty());
    assert!(parse_catalog_json("null").expect("null").is_empty());
    assert!(parse_catalog_json("{\"id\":1}").is_err());
}

#[test]
fn parses_ownership_fixture() {
    let raw = read_fixture("ownership.json");
    let ownership = parse_ownership_json(&raw).expect("fixture should parse");
    assert_eq!(ownership.len(), 3);
    assert_eq!(ownership["ger-tiger-i"].copies, 2);
    assert!(!ownership["17"].is_owned());
    assert_eq!(ownership["gen-commander"].copies, 1);
}

#[test]
fn normalises_rate_limit_payload() {
    let raw = read_fixture("sign_in_rate_limit.json");
    let failure = parse_sign_in_failure(400, &raw);
    assert_eq!(failure.status, 429);
    assert_eq!(
        failure.rate_limit_code.as_deref(),
        Some("over_email_send_rate_limit")
    );
    assert!(failure.is_rate_limited());
    assert_eq!(parse_wait_seconds(&failure.message), 54);
}

#[test]
fn non_json_failure_keeps_status() {
    let failure = parse_sign_in_failure(502, "<html>Bad gateway</html>");
    assert_eq!(failure.status, 502);
    assert_eq!(failure.rate_limit_code, None);
    assert!(!failure.is_rate_limited());

    let failure = parse_sign_in_failure(429, "");
    assert_eq!(failure.message, "HTTP 429");
    assert!(failure.is_rate_limited());
}

#[test]
fn parses_session_fixture() {
    let raw = read_fixture("session.json");
    let session = parse_session_json(&raw, "typed@example.com").expect("session");
    assert_eq!(session.user_id, "9f0c2a1e-user");
    assert_eq!(session.email, "cmdr@example.com");
    assert!(parse_session_json("{}", "a@b.c").is_err());
}

#[test]
fn inserted_id_accepts_row_or_array() {
    assert_eq!(parse_inserted_id(r#"[{"id": 12}]"#).expect("array"), "12");
    assert_eq!(parse_inserted_id(r#"{"id": "abc"}"#).expect("object"), "abc");
    assert!(parse_inserted_id("[]").is_err());
}
