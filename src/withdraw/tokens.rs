//! Slot Tokens
//!
//! A multi-use link can be printed as several vouchers, each carrying its own
//! slot token. A slot token is a pure function of the link identity and one
//! use marker, so it survives restarts and needs no storage.
//!
//! Tokens are UUIDv5 values rendered in base57, 22 characters long. They
//! select which remaining use a lookup refers to; they do not authorize a
//! payment (the link's k1 still does that).

use uuid::Uuid;

use crate::types::link::WithdrawLink;

/// Base57 alphabet (no 0, 1, I, O, l)
const ALPHABET: &[u8; 57] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of an encoded 128-bit value in base57
pub const SLOT_TOKEN_LEN: usize = 22;

/// Derive the slot token for one use marker of a link
pub fn derive_slot_token(link_id: &str, link_hash: &str, marker: u32) -> String {
    let name = format!("{}{}{}", link_id, link_hash, marker);
    encode_base57(name_uuid(&name))
}

/// Slot tokens of every remaining use, in marker order
pub fn slot_tokens(link: &WithdrawLink) -> Vec<String> {
    link.use_markers
        .iter()
        .map(|marker| derive_slot_token(&link.id, &link.link_hash, *marker))
        .collect()
}

/// Find the remaining marker whose token equals `slot_token`
pub fn find_slot(link: &WithdrawLink, slot_token: &str) -> Option<u32> {
    if slot_token.len() != SLOT_TOKEN_LEN {
        return None;
    }

    link.use_markers
        .iter()
        .copied()
        .find(|marker| derive_slot_token(&link.id, &link.link_hash, *marker) == slot_token)
}

/// Name-based UUID; URL-looking names use the URL namespace
fn name_uuid(name: &str) -> Uuid {
    let lower = name.to_lowercase();
    let namespace = if lower.starts_with("http://") || lower.starts_with("https://") {
        Uuid::NAMESPACE_URL
    } else {
        Uuid::NAMESPACE_DNS
    };
    Uuid::new_v5(&namespace, name.as_bytes())
}

/// Most significant digit first, left-padded with the zero digit
fn encode_base57(uuid: Uuid) -> String {
    let base = ALPHABET.len() as u128;
    let mut n = uuid.as_u128();
    let mut digits = Vec::with_capacity(SLOT_TOKEN_LEN);

    while n > 0 {
        digits.push(ALPHABET[(n % base) as usize]);
        n /= base;
    }
    while digits.len() < SLOT_TOKEN_LEN {
        digits.push(ALPHABET[0]);
    }

    digits.iter().rev().map(|&b| b as char).collect()
}
