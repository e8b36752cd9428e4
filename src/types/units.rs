//! Unit Conversion Utilities
//!
//! Links are denominated in satoshis; LNURL advertises millisatoshis.

/// Millisatoshis per satoshi
pub const MSATS_PER_SAT: u64 = 1_000;

/// Convert satoshis to millisatoshis (saturating)
pub fn sats_to_msats(sats: u64) -> u64 {
    sats.saturating_mul(MSATS_PER_SAT)
}

/// Human-readable amount, e.g. "1,000 sats"
pub fn sats_to_display(sats: u64) -> String {
    format!("{} sats", format_with_commas(sats))
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
