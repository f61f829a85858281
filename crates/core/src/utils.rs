use alloy::primitives::{Address, U256};
use alloy::primitives::utils::parse_units;
use anyhow::anyhow;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn parse_address(s: &str) -> anyhow::Result<Address> {
    Address::from_str(s.trim()).map_err(|e| anyhow!("invalid address {s}: {e}"))
}

/// Converts a decimal amount such as `"0.01"` into base units with `decimals` places.
pub fn parse_decimal_amount(s: &str, decimals: u8) -> anyhow::Result<U256> {
    let parsed = parse_units(s.trim(), decimals)
        .map_err(|e| anyhow!("invalid amount {s}: {e}"))?;
    let value: U256 = parsed.into();
    Ok(value)
}

/// Keeps the first and last four characters, masking the rest.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}

pub fn is_valid_evm_private_key(key: &str) -> bool {
    let stripped = key.trim().trim_start_matches("0x");
    stripped.len() == 64 && stripped.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_valid_evm_address(address: &str) -> bool {
    let trimmed = address.trim();
    trimmed.len() == 42
        && trimmed.starts_with("0x")
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit())
}
