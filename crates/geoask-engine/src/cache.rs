//! Model response cache.
//!
//! Keys are a digest of the prompt text, normalized so that indentation and
//! blank-line differences do not cause misses:
//! - algorithm: FNV-1a 64-bit
//! - input: prompt lines, each trimmed, blank lines dropped, joined by `\n`
//! - output: `"fnv1a64:<16 lowercase hex digits>"`
//!
//! The digest is not a security primitive.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

pub const PROMPT_KEY_PREFIX: &str = "fnv1a64:";

pub trait ResponseCache: Send + Sync {
    fn get(&self, prompt: &str) -> Option<String>;
    fn put(&self, prompt: &str, response: String);
}

pub fn prompt_key(prompt: &str) -> String {
    let normalized = prompt
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    fnv1a64_digest_bytes(normalized.as_bytes())
}

fn fnv1a64_digest_bytes(bytes: &[u8]) -> String {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    format!("{PROMPT_KEY_PREFIX}{hash:016x}")
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, String>,
    /// Least recently used first.
    order: VecDeque<String>,
}

impl Entries {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

/// In-process cache, optionally bounded with least-recently-used eviction.
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    capacity: Option<usize>,
    entries: Mutex<Entries>,
}

impl MemoryResponseCache {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// `None` means unbounded, matching `GeoaskConfig::response_cache_capacity`.
    pub fn new(capacity: Option<usize>) -> Self {
        match capacity {
            Some(n) => Self::with_capacity(n),
            None => Self::unbounded(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(&self, prompt: &str) -> Option<String> {
        let key = prompt_key(prompt);
        let mut entries = self.entries.lock();
        let hit = entries.map.get(&key).cloned();
        if hit.is_some() {
            entries.touch(&key);
        }
        tracing::debug!(key = %key, hit = hit.is_some(), "response cache lookup");
        hit
    }

    fn put(&self, prompt: &str, response: String) {
        if self.capacity == Some(0) {
            return;
        }
        let key = prompt_key(prompt);
        let mut entries = self.entries.lock();
        if entries.map.insert(key.clone(), response).is_some() {
            entries.touch(&key);
        } else {
            entries.order.push_back(key);
        }
        if let Some(capacity) = self.capacity {
            while entries.map.len() > capacity {
                let Some(oldest) = entries.order.pop_front() else {
                    break;
                };
                entries.map.remove(&oldest);
                tracing::debug!(key = %oldest, "evicted cached response");
            }
        }
    }
}
