//! Offline backend: seeded catalog, per-user ownership derived from the user id,
//! a simulated sign-in rate limiter and decks stored in SQLite.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

use crate::backend::{Backend, CatalogBatch};
use crate::catalog::{OwnershipMap, OwnershipRecord, Unit};
use crate::deck::DeckSubmission;
use crate::error::{SignInError, SignInFailure};
use crate::state::Session;
use crate::store;

pub const DEFAULT_DEMO_COOLDOWN_SECS: u64 = 60;
const RATE_LIMIT_CODE: &str = "over_email_send_rate_limit";

pub struct DemoBackend {
    conn: Connection,
    cooldown: Duration,
    last_request: Option<Instant>,
}

impl DemoBackend {
    /// `db_path` of `None` keeps saved decks in memory.
    pub fn new(db_path: Option<&Path>, cooldown_secs: u64) -> Result<Self> {
        let conn = match db_path {
            Some(path) => store::open_db(path)?,
            None => store::open_in_memory()?,
        };
        Ok(Self {
            conn,
            cooldown: Duration::from_secs(cooldown_secs),
            last_request: None,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn seconds_until_allowed(&self) -> u64 {
        let Some(last) = self.last_request else {
            return 0;
        };
        let elapsed = last.elapsed();
        if elapsed >= self.cooldown {
            return 0;
        }
        let left = self.cooldown - elapsed;
        left.as_millis().div_ceil(1000) as u64
    }
}

impl Backend for DemoBackend {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn fetch_catalog(&mut self) -> Result<CatalogBatch> {
        Ok(CatalogBatch {
            units: seed_catalog(),
            stale: false,
        })
    }

    fn fetch_ownership(&mut self, session: &Session) -> Result<OwnershipMap> {
        Ok(seed_ownership(&session.user_id, &seed_catalog()))
    }

    fn request_sign_in(&mut self, email: &str) -> Result<(), SignInError> {
        if !email.contains('@') {
            return Err(SignInError::Rejected(SignInFailure {
                status: 422,
                rate_limit_code: None,
                message: "Unable to validate email address: invalid format".to_string(),
            }));
        }
        let wait = self.seconds_until_allowed();
        if wait > 0 {
            return Err(SignInError::Rejected(SignInFailure {
                status: 429,
                rate_limit_code: Some(RATE_LIMIT_CODE.to_string()),
                message: format!(
                    "For security purposes, you can only request this after {wait} seconds."
                ),
            }));
        }
        self.last_request = Some(Instant::now());
        Ok(())
    }

    fn verify_sign_in(&mut self, email: &str, code: &str) -> Result<Session> {
        let code = code.trim();
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("token has expired or is invalid"));
        }
        let email = email.trim().to_lowercase();
        let user_id = format!("demo-{:016x}", seed_for(&email));
        Ok(Session {
            access_token: format!("demo-token-{user_id}"),
            user_id,
            email,
        })
    }

    fn save_deck(&mut self, session: &Session, submission: &DeckSubmission) -> Result<String> {
        store::insert_deck(&mut self.conn, &session.user_id, submission)
    }
}

/// FNV-1a; stable across runs so a user always sees the same collection.
fn seed_for(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

pub fn seed_ownership(user_id: &str, units: &[Unit]) -> OwnershipMap {
    let mut rng = StdRng::seed_from_u64(seed_for(user_id));
    let mut out = OwnershipMap::with_capacity(units.len());
    for unit in units {
        let owned = rng.gen_bool(0.7);
        let copies = if owned { rng.gen_range(1..=3) } else { 0 };
        out.insert(unit.id.clone(), OwnershipRecord { owned, copies });
    }
    out
}

struct Seed {
    id: &'static str,
    name: &'static str,
    nation: &'static str,
    unit_type: &'static str,
    year: i32,
    points: u32,
    set_name: &'static str,
    rarity: &'static str,
    abilities: &'static str,
    stats: [f64; 4],
}

const SEEDS: &[Seed] = &[
    Seed { id: "ger-tiger-i", name: "Tiger I", nation: "Germany", unit_type: "Vehicle", year: 1942, points: 45, set_name: "Base Set", rarity: "Rare", abilities: "Heavy Armor", stats: [14.0, 14.0, 12.0, 10.0] },
    Seed { id: "ger-panther", name: "Panther", nation: "Germany", unit_type: "Vehicle", year: 1943, points: 38, set_name: "Eastern Front", rarity: "Rare", abilities: "Sloped Armor", stats: [13.0, 13.0, 11.0, 9.0] },
    Seed { id: "ger-panzer-iv", name: "Panzer IV Ausf. H", nation: "Germany", unit_type: "Vehicle", year: 1943, points: 22, set_name: "Base Set", rarity: "Uncommon", abilities: "", stats: [10.0, 10.0, 8.0, 6.0] },
    Seed { id: "ger-stug-iii", name: "StuG III", nation: "Germany", unit_type: "Vehicle", year: 1942, points: 17, set_name: "Contested Skies", rarity: "Common", abilities: "Low Profile", stats: [9.0, 9.0, 7.0, 5.0] },
    Seed { id: "ger-grenadier", name: "Grenadier", nation: "Germany", unit_type: "Soldier", year: 1939, points: 7, set_name: "Base Set", rarity: "Common", abilities: "", stats: [6.0, 5.0, 3.0, 0.0] },
    Seed { id: "ger-mg42", name: "MG 42 Team", nation: "Germany", unit_type: "Soldier", year: 1942, points: 11, set_name: "Base Set", rarity: "Uncommon", abilities: "Suppressive Fire", stats: [10.0, 8.0, 6.0, 0.0] },
    Seed { id: "ger-88", name: "88mm Flak", nation: "Germany", unit_type: "Artillery", year: 1940, points: 26, set_name: "North Africa", rarity: "Rare", abilities: "Dual Purpose", stats: [12.0, 12.0, 12.0, 12.0] },
    Seed { id: "ger-stuka", name: "Ju 87 Stuka", nation: "Germany", unit_type: "Aircraft", year: 1939, points: 30, set_name: "Contested Skies", rarity: "Rare", abilities: "Dive Bomber", stats: [16.0, 0.0, 0.0, 0.0] },
    Seed { id: "ita-m13", name: "M13/40", nation: "Italy", unit_type: "Vehicle", year: 1940, points: 12, set_name: "North Africa", rarity: "Common", abilities: "", stats: [7.0, 6.0, 4.0, 2.0] },
    Seed { id: "ita-bersaglieri", name: "Bersaglieri", nation: "Italy", unit_type: "Soldier", year: 1940, points: 8, set_name: "North Africa", rarity: "Uncommon", abilities: "Fast Mover", stats: [6.0, 5.0, 3.0, 0.0] },
    Seed { id: "jpn-chi-ha", name: "Type 97 Chi-Ha", nation: "Japan", unit_type: "Vehicle", year: 1938, points: 11, set_name: "Pacific", rarity: "Common", abilities: "", stats: [6.0, 6.0, 4.0, 2.0] },
    Seed { id: "jpn-rikusentai", name: "Rikusentai", nation: "Japan", unit_type: "Soldier", year: 1941, points: 8, set_name: "Pacific", rarity: "Common", abilities: "Banzai", stats: [7.0, 4.0, 2.0, 0.0] },
    Seed { id: "jpn-zero", name: "A6M Zero", nation: "Japan", unit_type: "Aircraft", year: 1940, points: 24, set_name: "Pacific", rarity: "Rare", abilities: "Dogfighter", stats: [12.0, 0.0, 0.0, 0.0] },
    Seed { id: "hun-turan", name: "Turan II", nation: "Hungary", unit_type: "Vehicle", year: 1943, points: 15, set_name: "Eastern Front", rarity: "Uncommon", abilities: "", stats: [8.0, 7.0, 5.0, 3.0] },
    Seed { id: "fin-jaeger", name: "Jaeger Platoon", nation: "Finland", unit_type: "Soldier", year: 1939, points: 9, set_name: "Winter War", rarity: "Uncommon", abilities: "Ski Troops", stats: [7.0, 6.0, 4.0, 0.0] },
    Seed { id: "us-sherman", name: "M4A3 Sherman", nation: "United States", unit_type: "Vehicle", year: 1942, points: 20, set_name: "Base Set", rarity: "Common", abilities: "", stats: [9.0, 9.0, 7.0, 5.0] },
    Seed { id: "us-pershing", name: "M26 Pershing", nation: "United States", unit_type: "Vehicle", year: 1945, points: 36, set_name: "Reinforcements", rarity: "Rare", abilities: "Heavy Armor", stats: [13.0, 13.0, 11.0, 8.0] },
    Seed { id: "us-rifleman", name: "Airborne Rifleman", nation: "United States", unit_type: "Soldier", year: 1943, points: 8, set_name: "Base Set", rarity: "Common", abilities: "Paradrop", stats: [6.0, 5.0, 3.0, 0.0] },
    Seed { id: "us-bazooka", name: "Bazooka Team", nation: "United States", unit_type: "Soldier", year: 1942, points: 10, set_name: "Reinforcements", rarity: "Uncommon", abilities: "Anti-Tank", stats: [9.0, 7.0, 0.0, 0.0] },
    Seed { id: "us-p47", name: "P-47 Thunderbolt", nation: "United States", unit_type: "Aircraft", year: 1943, points: 28, set_name: "Contested Skies", rarity: "Rare", abilities: "Ground Attack", stats: [15.0, 0.0, 0.0, 0.0] },
    Seed { id: "uk-churchill", name: "Churchill VII", nation: "United Kingdom", unit_type: "Vehicle", year: 1944, points: 27, set_name: "Reinforcements", rarity: "Uncommon", abilities: "Heavy Armor", stats: [10.0, 10.0, 8.0, 5.0] },
    Seed { id: "uk-firefly", name: "Sherman Firefly", nation: "United Kingdom", unit_type: "Vehicle", year: 1944, points: 25, set_name: "Base Set", rarity: "Rare", abilities: "17-pounder", stats: [12.0, 12.0, 11.0, 9.0] },
    Seed { id: "uk-commando", name: "Commando", nation: "United Kingdom", unit_type: "Soldier", year: 1941, points: 10, set_name: "Base Set", rarity: "Uncommon", abilities: "Stealth", stats: [8.0, 6.0, 3.0, 0.0] },
    Seed { id: "uk-25pdr", name: "25-pounder", nation: "United Kingdom", unit_type: "Artillery", year: 1940, points: 18, set_name: "North Africa", rarity: "Common", abilities: "Indirect Fire", stats: [6.0, 8.0, 10.0, 12.0] },
    Seed { id: "sov-t34", name: "T-34/85", nation: "Soviet Union", unit_type: "Vehicle", year: 1944, points: 23, set_name: "Eastern Front", rarity: "Common", abilities: "", stats: [11.0, 10.0, 8.0, 6.0] },
    Seed { id: "sov-is2", name: "IS-2", nation: "Soviet Union", unit_type: "Vehicle", year: 1944, points: 40, set_name: "Eastern Front", rarity: "Rare", abilities: "Heavy Armor", stats: [14.0, 13.0, 11.0, 9.0] },
    Seed { id: "sov-guards", name: "Guards Rifleman", nation: "Soviet Union", unit_type: "Soldier", year: 1942, points: 6, set_name: "Eastern Front", rarity: "Common", abilities: "Human Wave", stats: [5.0, 4.0, 2.0, 0.0] },
    Seed { id: "sov-katyusha", name: "Katyusha", nation: "Soviet Union", unit_type: "Artillery", year: 1941, points: 21, set_name: "Eastern Front", rarity: "Uncommon", abilities: "Barrage", stats: [0.0, 8.0, 12.0, 14.0] },
    Seed { id: "fra-char-b1", name: "Char B1 bis", nation: "France", unit_type: "Vehicle", year: 1940, points: 19, set_name: "Blitzkrieg", rarity: "Uncommon", abilities: "", stats: [8.0, 8.0, 6.0, 4.0] },
    Seed { id: "pol-lancer", name: "Uhlan Lancer", nation: "Poland", unit_type: "Soldier", year: 1939, points: 6, set_name: "Blitzkrieg", rarity: "Common", abilities: "Cavalry", stats: [5.0, 2.0, 0.0, 0.0] },
    Seed { id: "gen-commander", name: "Field Commander", nation: "Neutral", unit_type: "Officer", year: 1939, points: 0, set_name: "Promo", rarity: "Promo", abilities: "Command Aura", stats: [1.0, 0.0, 0.0, 0.0] },
];

pub fn seed_catalog() -> Vec<Unit> {
    SEEDS
        .iter()
        .map(|seed| Unit {
            id: seed.id.to_string(),
            name: seed.name.to_string(),
            nation: seed.nation.to_string(),
            unit_type: seed.unit_type.to_string(),
            year: Some(seed.year),
            points: seed.points,
            set_name: seed.set_name.to_string(),
            rarity: seed.rarity.to_string(),
            abilities: seed.abilities.to_string(),
            stats: seed
                .stats
                .iter()
                .enumerate()
                .map(|(range, eff)| (range as u8, *eff))
                .collect::<BTreeMap<_, _>>(),
        })
        .collect()
}
