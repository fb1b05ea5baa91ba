/*
[INPUT]:  Message bytes and optional secret key bytes
[OUTPUT]: Ed25519 signatures and base58-encoded public keys
[POS]:    Provider layer - key material behind the Solana wallet provider
[UPDATE]: When changing signing algorithm or key format
*/

use bs58;
use ed25519_dalek::{Signature, Signer, SigningKey};

use crate::error::{ConnectError, Result};

/// Ed25519 signer backing Solana accounts
#[derive(Debug)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Create signer from existing secret key bytes (32 bytes)
    pub fn from_secret_key(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self { signing_key }
    }

    /// Create signer from a base58 private key.
    ///
    /// Accepts a 32-byte seed or a 64-byte keypair (seed followed by public key).
    pub fn from_base58(private_key_base58: &str) -> Result<Self> {
        let bytes = bs58::decode(private_key_base58.trim())
            .into_vec()
            .map_err(|e| ConnectError::InvalidParams(format!("Invalid base58 private key: {e}")))?;

        let seed: [u8; 32] = match bytes.len() {
            32 | 64 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes[..32]);
                seed
            }
            other => {
                return Err(ConnectError::InvalidParams(format!(
                    "Invalid private key length: expected 32 or 64 bytes, got {other}"
                )));
            }
        };

        let signer = Self::from_secret_key(&seed);
        if bytes.len() == 64 && bytes[32..] != signer.public_key_bytes() {
            return Err(ConnectError::InvalidParams(
                "Keypair public half does not match its secret".to_string(),
            ));
        }
        Ok(signer)
    }

    /// Sign a message and return the signature
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Get the public key in base58 encoding (the Solana address)
    pub fn public_key_base58(&self) -> String {
        let verifying_key = self.signing_key.verifying_key();
        bs58::encode(verifying_key.as_bytes()).into_string()
    }

    /// Get the raw public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

#[cfg(test)]
impl Ed25519Signer {
    pub(crate) fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub(crate) fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        use ed25519_dalek::Verifier;

        self.signing_key
            .verifying_key()
            .verify(message, signature)
            .is_ok()
    }
}
