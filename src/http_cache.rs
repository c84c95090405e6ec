//! On-disk cache of GET bodies keyed by url, revalidated with ETag / Last-Modified.
//! When the server is unreachable the last good body is served and flagged stale.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ETAG, HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "deck_terminal";
const RESPONSES_FILE: &str = "responses.json";
const RESPONSES_VERSION: u32 = 1;

static RESPONSES: Mutex<Option<ResponseStore>> = Mutex::new(None);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct ResponseStore {
    version: u32,
    bodies: HashMap<String, StoredBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredBody {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    stored_at_ms: i64,
}

impl StoredBody {
    fn revalidate(&self, mut req: RequestBuilder) -> RequestBuilder {
        if let Some(etag) = &self.etag {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(stamp) = &self.last_modified {
            req = req.header(IF_MODIFIED_SINCE, stamp);
        }
        req
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    /// Served from disk because the server could not be reached.
    pub stale: bool,
}

pub fn fetch_json_cached(
    client: &Client,
    url: &str,
    extra_headers: &[(&str, &str)],
) -> Result<Fetched> {
    let previous = lookup(url)?;

    let mut req = client.get(url);
    for (name, value) in extra_headers {
        req = req.header(*name, *value);
    }
    if let Some(stored) = &previous {
        req = stored.revalidate(req);
    }

    let resp = match (req.send(), previous.clone()) {
        (Ok(resp), _) => resp,
        (Err(_), Some(stored)) => {
            return Ok(Fetched {
                body: stored.body,
                stale: true,
            });
        }
        (Err(err), None) => return Err(err).context("request failed"),
    };

    let status = resp.status();
    if status == StatusCode::NOT_MODIFIED {
        let stored = previous.ok_or_else(|| anyhow!("304 for {url} with nothing cached"))?;
        return Ok(Fetched {
            body: stored.body,
            stale: false,
        });
    }

    let headers = resp.headers().clone();
    let body = resp.text().context("failed reading response body")?;
    if !status.is_success() {
        return Err(anyhow!("http {status}: {}", truncate(&body, 200)));
    }

    remember(
        url,
        StoredBody {
            body: body.clone(),
            etag: header_text(&headers, ETAG),
            last_modified: header_text(&headers, LAST_MODIFIED),
            stored_at_ms: Utc::now().timestamp_millis(),
        },
    );
    Ok(Fetched { body, stale: false })
}

fn header_text(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn lookup(url: &str) -> Result<Option<StoredBody>> {
    let mut guard = RESPONSES
        .lock()
        .map_err(|_| anyhow!("response cache lock poisoned"))?;
    let store = guard.get_or_insert_with(|| {
        responses_path()
            .map(|path| read_store(&path))
            .unwrap_or_default()
    });
    Ok(store.bodies.get(url).cloned())
}

fn remember(url: &str, stored: StoredBody) {
    let Ok(mut guard) = RESPONSES.lock() else {
        return;
    };
    let store = guard.get_or_insert_with(ResponseStore::default);
    store.version = RESPONSES_VERSION;
    store.bodies.insert(url.to_string(), stored);
    if let Some(path) = responses_path() {
        let _ = write_store(&path, store);
    }
}

fn read_store(path: &Path) -> ResponseStore {
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<ResponseStore>(&raw).ok())
        .filter(|store| store.version == RESPONSES_VERSION)
        .unwrap_or_default()
}

fn write_store(path: &Path, store: &ResponseStore) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(store).context("serialize response cache")?;
    fs::write(&tmp, json).context("write response cache")?;
    fs::rename(&tmp, path).context("swap response cache")?;
    Ok(())
}

/// `$XDG_CACHE_HOME/deck_terminal`, else `~/.cache/deck_terminal`.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = std::env::var("HOME").ok().filter(|h| !h.trim().is_empty())?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn responses_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(RESPONSES_FILE))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
