//! Prefixed identifier generation.
//!
//! Every entity id is a single discriminating letter followed by digits:
//! users `U…`, groups `G…`, sessions `S…`, contact applies `A…`. Message ids
//! additionally embed the creation date (`M20260801…`) so they sort roughly
//! by day. The first character is a protocol invariant — routing decides
//! private vs. group delivery by looking at it.

use chrono::{DateTime, Local};
use rand::Rng;

/// Digits appended after the prefix (and date, for messages).
const RANDOM_DIGITS: u32 = 11;

/// Generates collision-resistant prefixed ids and wire timestamps.
///
/// Constructed once at composition time and handed to whoever mints ids;
/// there is no process-wide instance.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Current local time, used for `created_at` stamps.
    pub fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    /// Message id: `M` + `YYYYMMDD` + random digits.
    pub fn message_id(&self) -> String {
        format!("M{}{}", Local::now().format("%Y%m%d"), random_digits())
    }

    pub fn user_id(&self) -> String {
        format!("U{}", random_digits())
    }

    pub fn group_id(&self) -> String {
        format!("G{}", random_digits())
    }

    pub fn session_id(&self) -> String {
        format!("S{}", random_digits())
    }

    pub fn apply_id(&self) -> String {
        format!("A{}", random_digits())
    }
}

/// A fixed-width run of random digits (first digit non-zero).
fn random_digits() -> String {
    let low = 10u64.pow(RANDOM_DIGITS - 1);
    let high = 10u64.pow(RANDOM_DIGITS);
    rand::thread_rng().gen_range(low..high).to_string()
}
