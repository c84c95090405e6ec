//! Provider boundary: catalog, ownership, passwordless sign-in and deck storage.
//!
//! The REST backend talks to a PostgREST-style data API and a GoTrue-style auth
//! API. Every wire shape is normalised here so nothing past this module depends
//! on field spellings.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};

use crate::catalog::{OwnershipMap, OwnershipRecord, Unit};
use crate::deck::DeckSubmission;
use crate::error::{SignInError, SignInFailure};
use crate::http_cache::fetch_json_cached;
use crate::http_client::http_client;
use crate::state::Session;

/// Catalog rows plus whether they came from the offline cache.
#[derive(Debug, Clone)]
pub struct CatalogBatch {
    pub units: Vec<Unit>,
    pub stale: bool,
}

pub trait Backend: Send {
    fn name(&self) -> &'static str;

    fn fetch_catalog(&mut self) -> Result<CatalogBatch>;

    fn fetch_ownership(&mut self, session: &Session) -> Result<OwnershipMap>;

    /// Asks the auth service to mail a one-time code.
    fn request_sign_in(&mut self, email: &str) -> Result<(), SignInError>;

    fn verify_sign_in(&mut self, email: &str, code: &str) -> Result<Session>;

    /// Stores the deck and returns its new identifier.
    fn save_deck(&mut self, session: &Session, submission: &DeckSubmission) -> Result<String>;
}

pub struct RestBackend {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_secs,
        }
    }

    fn client(&self) -> Result<&'static Client> {
        http_client(self.timeout_secs)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post_json(&self, path: &str, bearer: &str, body: &Value) -> Result<Response> {
        self.client()?
            .post(self.url(path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .with_context(|| format!("POST {path} failed"))
    }
}

impl Backend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn fetch_catalog(&mut self) -> Result<CatalogBatch> {
        let client = self.client()?;
        let url = self.url("/rest/v1/units?select=*,unit_stats(*)&order=name.asc");
        let auth = format!("Bearer {}", self.api_key);
        let fetched = fetch_json_cached(
            client,
            &url,
            &[("apikey", self.api_key.as_str()), ("Authorization", auth.as_str())],
        )?;
        Ok(CatalogBatch {
            units: parse_catalog_json(&fetched.body)?,
            stale: fetched.stale,
        })
    }

    fn fetch_ownership(&mut self, session: &Session) -> Result<OwnershipMap> {
        let resp = self
            .client()?
            .get(self.url("/rest/v1/user_units?select=unit_id,owned,copies"))
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .context("ownership request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading ownership body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status} from ownership endpoint"));
        }
        parse_ownership_json(&body)
    }

    fn request_sign_in(&mut self, email: &str) -> Result<(), SignInError> {
        let body = json!({ "email": email, "create_user": true });
        let resp = self.post_json("/auth/v1/otp", &self.api_key, &body)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let raw = resp.text().unwrap_or_default();
        Err(SignInError::Rejected(parse_sign_in_failure(
            status.as_u16(),
            &raw,
        )))
    }

    fn verify_sign_in(&mut self, email: &str, code: &str) -> Result<Session> {
        let body = json!({ "type": "email", "email": email, "token": code });
        let resp = self.post_json("/auth/v1/verify", &self.api_key, &body)?;
        let status = resp.status();
        let raw = resp.text().context("failed reading verify body")?;
        if !status.is_success() {
            let failure = parse_sign_in_failure(status.as_u16(), &raw);
            return Err(anyhow!("verify rejected ({}): {}", failure.status, failure.message));
        }
        parse_session_json(&raw, email)
    }

    fn save_deck(&mut self, session: &Session, submission: &DeckSubmission) -> Result<String> {
        let deck_row = json!({
            "user_id": session.user_id,
            "name": submission.name,
            "point_cap": submission.point_cap,
            "faction_rule": submission.faction_rule.key(),
            "total_points": submission.total_points,
        });
        let resp = self.post_json("/rest/v1/decks", &session.access_token, &deck_row)?;
        let status = resp.status();
        let raw = resp.text().context("failed reading deck insert body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status} from deck insert"));
        }
        let deck_id = parse_inserted_id(&raw)?;

        let rows: Vec<Value> = submission
            .entries
            .iter()
            .map(|e| json!({ "deck_id": deck_id, "unit_id": e.unit_id, "count": e.count }))
            .collect();
        let resp = self.post_json("/rest/v1/deck_units", &session.access_token, &Value::Array(rows))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("http {status} from deck entries insert"));
        }
        Ok(deck_id)
    }
}

/// Unit rows with joined stat rows (`unit_stats`, `stats` or an inline map).
pub fn parse_catalog_json(raw: &str) -> Result<Vec<Unit>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid catalog json")?;
    let rows = root
        .as_array()
        .ok_or_else(|| anyhow!("catalog json is not an array"))?;
    Ok(rows.iter().filter_map(parse_unit).collect())
}

fn parse_unit(value: &Value) -> Option<Unit> {
    let id = pick_string(value, &["id", "unit_id"])?;
    let name = pick_string(value, &["name"]).unwrap_or_default();
    Some(Unit {
        id,
        name,
        nation: pick_string(value, &["nation", "country"]).unwrap_or_default(),
        unit_type: pick_string(value, &["type", "unit_type"]).unwrap_or_default(),
        year: pick_u32(value, &["year"]).and_then(|y| i32::try_from(y).ok()),
        points: pick_u32(value, &["points", "cost"]).unwrap_or(0),
        set_name: pick_string(value, &["set_name", "set"]).unwrap_or_default(),
        rarity: pick_string(value, &["rarity"]).unwrap_or_default(),
        abilities: pick_string(value, &["abilities", "special_abilities"]).unwrap_or_default(),
        stats: parse_stats(value.get("unit_stats").or_else(|| value.get("stats"))),
    })
}

fn parse_stats(value: Option<&Value>) -> BTreeMap<u8, f64> {
    let mut out = BTreeMap::new();
    match value {
        Some(Value::Array(rows)) => {
            for row in rows {
                let Some(range) = pick_u32(row, &["range_index", "range"]) else {
                    continue;
                };
                let Ok(range) = u8::try_from(range) else {
                    continue;
                };
                if let Some(eff) = pick_f64(row, &["effective", "effective_damage", "value"]) {
                    *out.entry(range).or_insert(0.0) += eff;
                }
            }
        }
        Some(Value::Object(map)) => {
            for (key, v) in map {
                if let (Ok(range), Some(eff)) = (key.parse::<u8>(), as_f64(v)) {
                    out.insert(range, eff);
                }
            }
        }
        _ => {}
    }
    out
}

pub fn parse_ownership_json(raw: &str) -> Result<OwnershipMap> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(OwnershipMap::new());
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid ownership json")?;
    let rows = root
        .as_array()
        .ok_or_else(|| anyhow!("ownership json is not an array"))?;
    let mut out = OwnershipMap::with_capacity(rows.len());
    for row in rows {
        let Some(unit_id) = pick_string(row, &["unit_id", "id"]) else {
            continue;
        };
        let owned = row.get("owned").and_then(Value::as_bool).unwrap_or(false);
        let copies = pick_u32(row, &["copies", "count"]).unwrap_or(0);
        out.insert(unit_id, OwnershipRecord { owned, copies });
    }
    Ok(out)
}

/// Normalises an auth error body into status, rate-limit code and message.
pub fn parse_sign_in_failure(status: u16, raw: &str) -> SignInFailure {
    let trimmed = raw.trim();
    let parsed = serde_json::from_str::<Value>(trimmed).ok();
    let Some(root) = parsed.as_ref().filter(|v| v.is_object()) else {
        let message = if trimmed.is_empty() {
            format!("HTTP {status}")
        } else {
            trimmed.to_string()
        };
        return SignInFailure {
            status,
            rate_limit_code: None,
            message,
        };
    };

    let status = pick_u32(root, &["status", "code"])
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| (100..600).contains(s))
        .unwrap_or(status);
    let rate_limit_code = pick_string(root, &["error_code", "code"])
        .filter(|c| c.parse::<u32>().is_err());
    let message = pick_string(root, &["msg", "message", "error_description", "error"])
        .unwrap_or_else(|| format!("HTTP {status}"));
    SignInFailure {
        status,
        rate_limit_code,
        message,
    }
}

pub fn parse_session_json(raw: &str, email: &str) -> Result<Session> {
    let root: Value = serde_json::from_str(raw.trim()).context("invalid session json")?;
    let access_token = pick_string(&root, &["access_token"])
        .ok_or_else(|| anyhow!("session response has no access token"))?;
    let user = root.get("user").unwrap_or(&Value::Null);
    let user_id = pick_string(user, &["id"])
        .or_else(|| pick_string(&root, &["user_id"]))
        .ok_or_else(|| anyhow!("session response has no user id"))?;
    let email = pick_string(user, &["email"]).unwrap_or_else(|| email.to_string());
    Ok(Session {
        email,
        access_token,
        user_id,
    })
}

/// Id of the first row of a `return=representation` insert.
pub fn parse_inserted_id(raw: &str) -> Result<String> {
    let root: Value = serde_json::from_str(raw.trim()).context("invalid insert json")?;
    let row = match &root {
        Value::Array(rows) => rows.first().unwrap_or(&Value::Null),
        other => other,
    };
    pick_string(row, &["id"]).ok_or_else(|| anyhow!("insert response has no id"))
}

fn pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(v) = value.get(*key) {
            match v {
                Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
                Value::Number(n) => return Some(n.to_string()),
                _ => {}
            }
        }
    }
    None
}

fn pick_u32(value: &Value, keys: &[&str]) -> Option<u32> {
    for key in keys {
        if let Some(v) = value.get(*key) {
            if let Some(num) = v.as_u64() {
                return u32::try_from(num).ok();
            }
            if let Some(s) = v.as_str()
                && let Ok(num) = s.trim().parse::<u32>()
            {
                return Some(num);
            }
        }
    }
    None
}

fn pick_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| value.get(*key).and_then(as_f64))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
