//! Signature subsystem: Ed25519 over Curve25519.
//!
//! Messages are never signed directly: the signer signs `digest(message)`,
//! so a signature is bound to exactly one message digest and one public key.
//! Signatures are the raw 64-byte `R || S` encoding.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::digest::Digest;
use crate::error::{CoreError, Result};

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Create from raw bytes. No curve check happens until verification.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidKey("public key must be 32 bytes".into()))?;
        Ok(Self(arr))
    }

    /// Decompress into a usable verifying key.
    fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CoreError::InvalidKey("not a valid curve point".into()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| CoreError::InvalidSignatureEncoding(e.to_string()))?;
        let arr: [u8; 64] = bytes.try_into().map_err(|_| {
            CoreError::InvalidSignatureEncoding("signature must be 64 bytes".into())
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

/// A signing keypair.
///
/// The core never persists the private half; callers that need it use
/// [`Keypair::private_key_hex`] and own the custody problem.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    ///
    /// Resamples if the derived public key is a small-order point.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let signing_key = SigningKey::generate(&mut rng);
            if !signing_key.verifying_key().is_weak() {
                return Self { signing_key };
            }
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Restore from a hex-encoded 32-byte seed.
    pub fn from_private_key_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidKey("private key must be 32 bytes".into()))?;
        Ok(Self::from_seed(&seed))
    }

    /// Export the seed as hex.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign `digest(message)`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let digest = Digest::hash(message);
        Signature(self.signing_key.sign(digest.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?}, <redacted>)", self.public_key())
    }
}

/// Generate a fresh keypair. The private half is the caller's to keep.
pub fn generate_keypair() -> Keypair {
    Keypair::generate()
}

/// Sign `digest(message)` with the given keypair.
pub fn sign(message: &[u8], keypair: &Keypair) -> Signature {
    keypair.sign(message)
}

/// Sign with a hex-encoded private key.
pub fn sign_hex(message: &[u8], private_key_hex: &str) -> Result<Signature> {
    Ok(Keypair::from_private_key_hex(private_key_hex)?.sign(message))
}

/// Verify a signature over `digest(message)`.
///
/// Never fails loudly: an invalid key, a non-canonical signature or a
/// mismatch all yield `false`.
pub fn verify(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = public_key.verifying_key() else {
        return false;
    };
    let digest = Digest::hash(message);
    let sig = DalekSignature::from_bytes(&signature.0);
    verifying_key.verify_strict(digest.as_bytes(), &sig).is_ok()
}

/// Verify with hex-encoded signature and public key.
///
/// Bad hex or wrong lengths yield `false`.
pub fn verify_hex(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    match (
        Signature::from_hex(signature_hex),
        PublicKey::from_hex(public_key_hex),
    ) {
        (Ok(signature), Ok(public_key)) => verify(message, &signature, &public_key),
        _ => false,
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
