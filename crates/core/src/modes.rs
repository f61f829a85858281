use anyhow::anyhow;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GasMode {
    Eip1559,
    Legacy,
}

impl GasMode {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "eip1559" | "eip-1559" | "1559" => Ok(Self::Eip1559),
            "legacy" => Ok(Self::Legacy),
            _ => Err(anyhow!("unsupported executor.gas_mode: {raw}").into()),
        }
    }
}

/// What the executor waits for before declaring a purchase successful.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationMode {
    /// Broadcast accepted by the node.
    Submitted,
    /// Receipt observed with a success status.
    Receipt,
}

impl ConfirmationMode {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "submitted" | "broadcast" => Ok(Self::Submitted),
            "receipt" | "confirmed" => Ok(Self::Receipt),
            _ => Err(anyhow!("unsupported executor.confirmation: {raw}").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!(GasMode::parse("Legacy").unwrap(), GasMode::Legacy);
        assert_eq!(GasMode::parse("eip-1559").unwrap(), GasMode::Eip1559);
        assert_eq!(
            ConfirmationMode::parse("receipt").unwrap(),
            ConfirmationMode::Receipt
        );
        assert!(ConfirmationMode::parse("final").is_err());
    }
}
