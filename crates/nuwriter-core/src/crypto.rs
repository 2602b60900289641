//! AES-CFB128 and ECDSA P-256 services
//!
//! Images are encrypted with AES-256 in CFB mode (128-bit segments) and
//! signed over the ciphertext with ECDSA/SHA-256. Signatures are stored as
//! raw `R || S`, 64 bytes.
//!
//! The boot ROM decrypts with an all-zero IV, so every image encrypted
//! under one key reuses the same keystream. Keys must not be shared between
//! builds; [`encrypt_with_iv`] exists for callers that control both sides.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::Aes256;
use p256::ecdsa::signature::{DigestSigner, DigestVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// AES-256 key length
pub const AES_KEY_SIZE: usize = 32;
/// Raw `R || S` signature length
pub const SIGNATURE_SIZE: usize = 64;
/// IV the boot ROM uses
pub const ZERO_IV: [u8; 16] = [0; 16];

/// AES-256 key
pub type AesKey = [u8; AES_KEY_SIZE];

/// Fresh random AES key
pub fn random_aes_key() -> AesKey {
    let mut key = [0u8; AES_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Parse a 64-character hex AES key
pub fn parse_aes_key(text: &str) -> Result<AesKey> {
    let bytes = hex::decode(text.trim()).map_err(|e| Error::Crypto(format!("AES key: {}", e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        Error::Crypto(format!("AES key must be {} bytes, got {}", AES_KEY_SIZE, b.len()))
    })
}

/// Encrypt with the zero IV the boot ROM expects
pub fn encrypt(key: &AesKey, data: &[u8]) -> Vec<u8> {
    encrypt_with_iv(key, &ZERO_IV, data)
}

/// Encrypt with a caller-chosen IV
pub fn encrypt_with_iv(key: &AesKey, iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    Aes256CfbEnc::new(key.into(), iv.into()).encrypt(&mut buf);
    buf
}

/// Inverse of [`encrypt_with_iv`]
pub fn decrypt_with_iv(key: &AesKey, iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    Aes256CfbDec::new(key.into(), iv.into()).decrypt(&mut buf);
    buf
}

/// Inverse of [`encrypt`]
pub fn decrypt(key: &AesKey, data: &[u8]) -> Vec<u8> {
    decrypt_with_iv(key, &ZERO_IV, data)
}

/// ECDSA P-256 signing key
#[derive(Clone)]
pub struct EcdsaKey {
    inner: SigningKey,
}

impl std::fmt::Debug for EcdsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (x, _) = self.public_hex();
        f.debug_struct("EcdsaKey").field("public_x", &x).finish()
    }
}

impl EcdsaKey {
    /// Fresh random key pair
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::random(&mut OsRng),
        }
    }

    /// Parse a 32-byte private scalar given as hex
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes =
            hex::decode(text.trim()).map_err(|e| Error::Crypto(format!("ECDSA key: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a 32-byte private scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = SigningKey::from_slice(bytes)
            .map_err(|e| Error::Crypto(format!("invalid ECDSA private key: {}", e)))?;
        Ok(Self { inner })
    }

    /// Private scalar as uppercase hex
    pub fn private_hex(&self) -> String {
        hex::encode_upper(self.inner.to_bytes())
    }

    /// Public point coordinates, big-endian
    pub fn public_xy(&self) -> ([u8; 32], [u8; 32]) {
        let point = self.inner.verifying_key().to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        // An uncompressed point of a valid key always carries both coordinates
        if let (Some(px), Some(py)) = (point.x(), point.y()) {
            x.copy_from_slice(px);
            y.copy_from_slice(py);
        }
        (x, y)
    }

    /// Public point coordinates as 64-character uppercase hex
    pub fn public_hex(&self) -> (String, String) {
        let (x, y) = self.public_xy();
        (hex::encode_upper(x), hex::encode_upper(y))
    }

    /// Sign `data` with SHA-256; returns raw `R || S`
    pub fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
        let sig: Signature = self
            .inner
            .try_sign_digest(Sha256::new_with_prefix(data))
            .map_err(|e| Error::Crypto(format!("signing failed: {}", e)))?;
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&sig.to_bytes());
        Ok(out)
    }
}

/// Check a raw `R || S` signature over `data` against public coordinates
pub fn verify(x: &[u8], y: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
    if x.len() != 32 || y.len() != 32 {
        return Err(Error::Crypto("public key coordinates must be 32 bytes".into()));
    }
    let point = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(x),
        FieldBytes::from_slice(y),
        false,
    );
    let key = VerifyingKey::from_encoded_point(&point)
        .map_err(|e| Error::Crypto(format!("invalid public key: {}", e)))?;
    let sig = Signature::from_slice(signature)
        .map_err(|e| Error::Crypto(format!("invalid signature: {}", e)))?;
    Ok(key
        .verify_digest(Sha256::new_with_prefix(data), &sig)
        .is_ok())
}

/// Key material produced for a secure build
#[derive(Debug, Clone)]
pub struct KeySet {
    /// Image encryption key
    pub aes: AesKey,
    /// Image signing key
    pub ecdsa: EcdsaKey,
}

impl KeySet {
    /// Use the given keys, generating whichever is missing
    pub fn resolve(aes: Option<AesKey>, ecdsa: Option<EcdsaKey>) -> Self {
        Self {
            aes: aes.unwrap_or_else(random_aes_key),
            ecdsa: ecdsa.unwrap_or_else(EcdsaKey::generate),
        }
    }

    /// Text of the key file written next to secure outputs
    pub fn key_file_text(&self) -> String {
        let (x, y) = self.ecdsa.public_hex();
        format!(
            "AES key:\n{}\nECDSA private key:\n{}\nECDSA public key:\n{}\n{}\n",
            hex::encode_upper(self.aes),
            self.ecdsa.private_hex(),
            x,
            y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIV: &str = "C9AFA9D845BA75166B5C215767B1D6934E50C3DB36E89B127B8A622B120F6721";

    #[test]
    fn test_cfb_roundtrip_and_prefix_property() {
        let key = [7u8; 32];
        let plain: Vec<u8> = (0..100u8).collect();
        let enc = encrypt(&key, &plain);
        assert_ne!(enc, plain);
        assert_eq!(decrypt(&key, &enc), plain);
        // CFB is a stream mode: a prefix encrypts to a prefix
        assert_eq!(encrypt(&key, &plain[..17]), enc[..17]);
    }

    #[test]
    fn test_iv_changes_ciphertext() {
        let key = [1u8; 32];
        let iv = [9u8; 16];
        let a = encrypt(&key, b"same input");
        let b = encrypt_with_iv(&key, &iv, b"same input");
        assert_ne!(a, b);
        assert_eq!(decrypt_with_iv(&key, &iv, &b), b"same input");
    }

    #[test]
    fn test_sign_and_verify() {
        let key = EcdsaKey::from_hex(PRIV).unwrap();
        let sig = key.sign(b"ciphertext").unwrap();
        let (x, y) = key.public_xy();
        assert!(verify(&x, &y, b"ciphertext", &sig).unwrap());
        assert!(!verify(&x, &y, b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_public_hex_is_fixed_width() {
        let key = EcdsaKey::from_hex(PRIV).unwrap();
        let (x, y) = key.public_hex();
        assert_eq!(x.len(), 64);
        assert_eq!(y.len(), 64);
        assert_eq!(key.private_hex(), PRIV);
        // Known public point for this scalar
        assert_eq!(
            x,
            "60FED4BA255A9D31C961EB74C6356D68C049B8923B61FA6CE669622E60F29FB6"
        );
    }

    #[test]
    fn test_bad_keys() {
        assert!(parse_aes_key("abcd").is_err());
        assert!(parse_aes_key("zz").is_err());
        assert!(EcdsaKey::from_hex(&"00".repeat(32)).is_err());
        assert_eq!(parse_aes_key(&"11".repeat(32)).unwrap(), [0x11; 32]);
    }

    #[test]
    fn test_key_file_text() {
        let keys = KeySet::resolve(Some([0xAB; 32]), Some(EcdsaKey::from_hex(PRIV).unwrap()));
        let text = keys.key_file_text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "AES key:");
        assert_eq!(lines[1], "AB".repeat(32));
        assert_eq!(lines[2], "ECDSA private key:");
        assert_eq!(lines[3], PRIV);
        assert_eq!(lines[4], "ECDSA public key:");
        assert_eq!(lines.len(), 7);
    }
}
