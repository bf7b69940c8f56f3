//! Keypair loading for the upgrade workflow.

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

/// Holds the creator keypair used to sign the vault transaction.
pub struct WalletManager {
    keypair: Keypair,
}

impl WalletManager {
    /// Resolve a keypair argument: a JSON byte array, a path to a keypair
    /// file, or a base58-encoded secret.
    pub fn from_source(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.starts_with('[') {
            Self::from_json(trimmed)
        } else if std::path::Path::new(trimmed).exists() {
            Self::from_file(trimmed)
        } else {
            Self::from_base58(trimmed)
        }
    }

    /// Load from a keypair file: 64 raw bytes or a JSON byte array.
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes =
            std::fs::read(path).with_context(|| format!("Failed to read keypair file: {}", path))?;

        if keypair_bytes.len() == 64 {
            Self::from_bytes(&keypair_bytes)
        } else {
            Self::from_json(std::str::from_utf8(&keypair_bytes).context("Keypair file not UTF-8")?)
        }
    }

    /// Parse a JSON byte-array secret, the format CI secrets carry.
    pub fn from_json(json: &str) -> Result<Self> {
        let bytes: Vec<u8> = serde_json::from_str(json).context("Failed to parse keypair JSON")?;
        Self::from_bytes(&bytes)
    }

    /// Parse a base58-encoded secret key.
    pub fn from_base58(encoded: &str) -> Result<Self> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .context("Failed to decode base58 keypair")?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            anyhow::bail!(
                "Invalid keypair length: expected 64 bytes, got {}",
                bytes.len()
            );
        }
        if bytes.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }
        let keypair = Keypair::try_from(bytes).context("Invalid keypair bytes")?;
        Ok(Self { keypair })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_byte_array() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let wallet = WalletManager::from_json(&json).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn parses_base58_secret() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let wallet = WalletManager::from_base58(&encoded).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn source_routes_json_file_and_base58() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let wallet = WalletManager::from_source(&json).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());

        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let wallet = WalletManager::from_source(&encoded).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());

        let path = std::env::temp_dir().join("upgrade-sender-wallet-source.json");
        std::fs::write(&path, &json).unwrap();
        let wallet = WalletManager::from_source(path.to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rejects_all_zero_key() {
        let json = serde_json::to_string(&vec![0u8; 64]).unwrap();
        assert!(WalletManager::from_json(&json).is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        let json = serde_json::to_string(&vec![1u8; 32]).unwrap();
        assert!(WalletManager::from_json(&json).is_err());
    }
}
