//! Ancestry tracking and recursive-delegation cycle detection.

use uuid::Uuid;

use crate::error::WardenError;

/// One entry in a root-to-leaf subtask ancestry chain (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestryEntry {
    pub sub_task_id: Uuid,
    pub parent_sub_task_id: Option<Uuid>,
    pub worker_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub agent_type: String,
    pub prompt_hash: String,
}

/// Errors specific to ancestry bookkeeping (kept separate from
/// [`WardenError`] so callers that only care about cycle detection don't
/// need to match the whole top-level enum; [`AncestryError`] converts
/// into it via `From`).
#[derive(Debug, thiserror::Error)]
pub enum AncestryError {
    #[error("cycle detected: {0}")]
    Cycle(String),
}

impl From<AncestryError> for WardenError {
    fn from(e: AncestryError) -> Self {
        match e {
            AncestryError::Cycle(detail) => WardenError::CycleDetected { detail },
        }
    }
}

/// Compute the prompt hash used for cycle detection (spec §4.1).
///
/// The prompt is lowercased, trimmed, and has internal whitespace runs
/// collapsed to a single space before a deterministic non-cryptographic
/// hash (DJB2) is computed and rendered in base-36. This makes
/// `hash(prompt) == hash(prompt_with_extra_whitespace) ==
/// hash(PROMPT_UPPERCASED)` hold, per spec §8.
pub fn hash_prompt(prompt: &str) -> String {
    let normalized = normalize_prompt(prompt);
    let digest = djb2(normalized.as_bytes());
    to_base36(digest)
}

fn normalize_prompt(prompt: &str) -> String {
    let lower = prompt.trim().to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut last_was_space = false;
    for c in lower.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

fn djb2(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

/// Detect a cycle in a proposed root-to-leaf chain (spec §4.1).
///
/// Fails if any two entries share `(worker_id, agent_type, prompt_hash)`,
/// or if any `sub_task_id` repeats.
pub fn detect_cycle(chain: &[AncestryEntry]) -> Result<(), WardenError> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_triples = std::collections::HashSet::new();

    for entry in chain {
        if !seen_ids.insert(entry.sub_task_id) {
            return Err(AncestryError::Cycle(format!(
                "sub_task_id {} repeats on this ancestry path",
                entry.sub_task_id
            ))
            .into());
        }
        let triple = (
            entry.worker_id,
            entry.agent_type.clone(),
            entry.prompt_hash.clone(),
        );
        if !seen_triples.insert(triple) {
            return Err(AncestryError::Cycle(format!(
                "worker {} has already delegated agent_type {:?} with this prompt on this path",
                entry.worker_id, entry.agent_type
            ))
            .into());
        }
    }
    Ok(())
}
