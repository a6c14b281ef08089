//! AES-256-CBC cipher for identity payloads
//!
//! The identity payload is serialized to JSON, PKCS#7 padded and encrypted
//! with AES-256 in CBC mode. The result is hex encoded so it can travel
//! inside a JWT claim.
//!
//! Two IV modes are supported:
//! - `IvMode::Random` draws a fresh IV per encryption and emits `hex(iv || ciphertext)`
//! - `IvMode::Fixed` reuses the configured IV and emits `hex(ciphertext)`, which
//!   keeps tokens byte-compatible with deployments that still use a shared IV

use aes::Aes256;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Required key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// AES block size, which is also the IV length
pub const BLOCK_SIZE: usize = 16;

/// Cipher errors
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Cipher key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Cipher IV must be 16 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("Ciphertext is not valid hex: {0}")]
    Decode(#[from] hex::FromHexError),

    #[error("Ciphertext length {0} is not a positive multiple of the block size")]
    InvalidLength(usize),

    #[error("Invalid PKCS#7 padding")]
    Padding,

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CipherError {
    /// Whether this error comes from bad key material rather than bad input
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CipherError::InvalidKeyLength(_) | CipherError::InvalidIvLength(_)
        )
    }
}

/// How the IV is chosen for each encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IvMode {
    /// Fresh random IV per encryption, prefixed to the ciphertext
    #[default]
    Random,
    /// The configured IV for every encryption (legacy token format)
    Fixed,
}

impl std::str::FromStr for IvMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(IvMode::Random),
            "fixed" => Ok(IvMode::Fixed),
            other => Err(format!("unknown IV mode '{}'", other)),
        }
    }
}

/// Symmetric cipher for identity payloads
#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; KEY_LEN],
    iv: [u8; BLOCK_SIZE],
    mode: IvMode,
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl PayloadCipher {
    /// Create a cipher, failing fast on bad key or IV lengths
    pub fn new(key: &[u8], iv: &[u8], mode: IvMode) -> Result<Self, CipherError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        let iv: [u8; BLOCK_SIZE] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength(iv.len()))?;

        Ok(Self { key, iv, mode })
    }

    pub fn mode(&self) -> IvMode {
        self.mode
    }

    /// Serialize and encrypt a payload, returning lowercase hex
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<String, CipherError> {
        let plaintext = serde_json::to_vec(payload)?;
        Ok(self.encrypt_bytes(&plaintext))
    }

    /// Encrypt raw bytes, returning lowercase hex
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> String {
        match self.mode {
            IvMode::Random => {
                let mut iv = [0u8; BLOCK_SIZE];
                rand::thread_rng().fill_bytes(&mut iv);

                let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

                let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&ciphertext);
                hex::encode(out)
            }
            IvMode::Fixed => {
                let ciphertext = Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
                hex::encode(ciphertext)
            }
        }
    }

    /// Decrypt hex ciphertext into the padded-stripped plaintext bytes
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CipherError> {
        let raw = hex::decode(encoded)?;

        let (iv, ciphertext) = match self.mode {
            IvMode::Random => {
                if raw.len() < BLOCK_SIZE {
                    return Err(CipherError::InvalidLength(raw.len()));
                }
                let (iv, rest) = raw.split_at(BLOCK_SIZE);
                let iv: [u8; BLOCK_SIZE] = iv
                    .try_into()
                    .map_err(|_| CipherError::InvalidLength(raw.len()))?;
                (iv, rest)
            }
            IvMode::Fixed => (self.iv, raw.as_slice()),
        };

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidLength(ciphertext.len()));
        }

        let padded = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| CipherError::InvalidLength(ciphertext.len()))?;

        pkcs7_unpad(padded)
    }

    /// Decrypt and deserialize a payload
    pub fn decrypt_json<T: DeserializeOwned>(&self, encoded: &str) -> Result<T, CipherError> {
        let plaintext = self.decrypt(encoded)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Strip PKCS#7 padding, rejecting any malformed trailer
fn pkcs7_unpad(mut data: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::InvalidLength(data.len()));
    }

    let pad = usize::from(data[data.len() - 1]);
    if pad == 0 || pad > BLOCK_SIZE {
        return Err(CipherError::Padding);
    }

    let start = data.len() - pad;
    if data[start..].iter().any(|&b| usize::from(b) != pad) {
        return Err(CipherError::Padding);
    }

    data.truncate(start);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::identity::{AccountType, IdentityPayload, Role};

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const IV: &[u8] = b"abcdef9876543210";

    fn payload() -> IdentityPayload {
        IdentityPayload {
            account_type: AccountType::Company,
            user_id: "6650c1f2a9b3e41d2c7f0a11".to_string(),
            user_role: Role::FleetManager,
            full_name: "Selam Transport".to_string(),
            username: "Selam Transport".to_string(),
            organization_id: Some("org-7".to_string()),
            phone_number: "+251911223344".to_string(),
        }
    }

    fn cipher(mode: IvMode) -> PayloadCipher {
        PayloadCipher::new(KEY, IV, mode).unwrap()
    }

    // ========================================================================
    // Construction Tests
    // ========================================================================

    #[test]
    fn test_rejects_short_key() {
        let err = PayloadCipher::new(b"too-short", IV, IvMode::Random).unwrap_err();
        assert!(matches!(err, CipherError::InvalidKeyLength(9)));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_rejects_bad_iv() {
        let err = PayloadCipher::new(KEY, b"0123456789abcdef0", IvMode::Fixed).unwrap_err();
        assert!(matches!(err, CipherError::InvalidIvLength(17)));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_iv_mode_from_str() {
        assert_eq!("random".parse::<IvMode>().unwrap(), IvMode::Random);
        assert_eq!(" FIXED ".parse::<IvMode>().unwrap(), IvMode::Fixed);
        assert!("cbc".parse::<IvMode>().is_err());
    }

    // ========================================================================
    // Round-trip Tests
    // ========================================================================

    #[test]
    fn test_round_trip_random_iv() {
        let cipher = cipher(IvMode::Random);
        let encrypted = cipher.encrypt(&payload()).unwrap();

        let decrypted: IdentityPayload = cipher.decrypt_json(&encrypted).unwrap();
        assert_eq!(decrypted, payload());
    }

    #[test]
    fn test_round_trip_fixed_iv() {
        let cipher = cipher(IvMode::Fixed);
        let encrypted = cipher.encrypt(&payload()).unwrap();

        let decrypted: IdentityPayload = cipher.decrypt_json(&encrypted).unwrap();
        assert_eq!(decrypted, payload());
    }

    #[test]
    fn test_output_is_lowercase_hex() {
        let encrypted = cipher(IvMode::Random).encrypt(&payload()).unwrap();

        assert!(
            encrypted
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
        assert_eq!((encrypted.len() / 2) % BLOCK_SIZE, 0);
    }

    #[test]
    fn test_random_iv_hides_repeated_plaintext() {
        let cipher = cipher(IvMode::Random);
        let a = cipher.encrypt(&payload()).unwrap();
        let b = cipher.encrypt(&payload()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fixed_iv_is_deterministic() {
        let cipher = cipher(IvMode::Fixed);
        let a = cipher.encrypt(&payload()).unwrap();
        let b = cipher.encrypt(&payload()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_exact_block_plaintext_gets_full_padding_block() {
        let cipher = cipher(IvMode::Fixed);
        let encrypted = cipher.encrypt_bytes(&[b'x'; BLOCK_SIZE]);

        assert_eq!(hex::decode(&encrypted).unwrap().len(), BLOCK_SIZE * 2);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), vec![b'x'; BLOCK_SIZE]);
    }

    #[test]
    fn test_wrong_key_does_not_yield_payload() {
        let encrypted = cipher(IvMode::Fixed).encrypt(&payload()).unwrap();
        let other =
            PayloadCipher::new(b"fedcba9876543210fedcba9876543210", IV, IvMode::Fixed).unwrap();

        assert!(other.decrypt_json::<IdentityPayload>(&encrypted).is_err());
    }

    // ========================================================================
    // Rejection Tests
    // ========================================================================

    #[test]
    fn test_rejects_malformed_hex() {
        let result = cipher(IvMode::Fixed).decrypt("zz11");
        assert!(matches!(result, Err(CipherError::Decode(_))));
    }

    #[test]
    fn test_rejects_length_not_multiple_of_block() {
        let result = cipher(IvMode::Fixed).decrypt(&hex::encode([0u8; 20]));
        assert!(matches!(result, Err(CipherError::InvalidLength(20))));
    }

    #[test]
    fn test_rejects_empty_ciphertext() {
        assert!(matches!(
            cipher(IvMode::Fixed).decrypt(""),
            Err(CipherError::InvalidLength(0))
        ));
        // Only an IV, no ciphertext blocks
        assert!(matches!(
            cipher(IvMode::Random).decrypt(&hex::encode([7u8; BLOCK_SIZE])),
            Err(CipherError::InvalidLength(0))
        ));
    }

    #[test]
    fn test_unpad_rejects_zero_padding() {
        let mut block = vec![b'a'; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 0;
        assert!(matches!(pkcs7_unpad(block), Err(CipherError::Padding)));
    }

    #[test]
    fn test_unpad_rejects_padding_longer_than_block() {
        let mut block = vec![b'a'; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 17;
        assert!(matches!(pkcs7_unpad(block), Err(CipherError::Padding)));
    }

    #[test]
    fn test_unpad_rejects_inconsistent_trailer() {
        let mut block = vec![b'a'; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 3;
        block[BLOCK_SIZE - 2] = 3;
        assert!(matches!(pkcs7_unpad(block), Err(CipherError::Padding)));
    }

    #[test]
    fn test_unpad_strips_valid_trailer() {
        let mut block = vec![b'a'; BLOCK_SIZE - 4];
        block.extend_from_slice(&[4, 4, 4, 4]);
        assert_eq!(pkcs7_unpad(block).unwrap(), vec![b'a'; BLOCK_SIZE - 4]);
    }

    #[test]
    fn test_single_byte_flip_never_yields_other_identity() {
        for mode in [IvMode::Random, IvMode::Fixed] {
            let cipher = cipher(mode);
            let original = payload();
            let raw = hex::decode(cipher.encrypt(&original).unwrap()).unwrap();

            for i in 0..raw.len() {
                let mut tampered = raw.clone();
                tampered[i] ^= 0x01;

                match cipher.decrypt_json::<IdentityPayload>(&hex::encode(&tampered)) {
                    Err(_) => {}
                    Ok(decoded) => panic!(
                        "byte {} flip in {:?} mode produced identity {:?}",
                        i, mode, decoded
                    ),
                }
            }
        }
    }
}
