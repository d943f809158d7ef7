//! Deterministic pseudonymization of user identifiers.
//!
//! Tokens are AES-256-CBC ciphertexts (PKCS7 padding) of the UTF-8 identifier,
//! encoded as standard base64. The IV is a fixed constant so that the same
//! identifier always yields the same token under a given key; tokens are used
//! as storage partition material and must collide for repeated events.

use std::fmt;

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Initialization vector shared by every token. Changing it changes every token.
const FIXED_IV: [u8; 16] = *b"16bytes-fixed-iv";

/// Reasons a token cannot be turned back into an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    #[error("token is not valid base64")]
    Encoding,

    #[error("token does not decrypt under this key")]
    Padding,

    #[error("decrypted token is not valid UTF-8")]
    Utf8,
}

/// Keyed, reversible transform from a user identifier to an opaque token.
#[derive(Clone)]
pub struct Pseudonymizer {
    key: [u8; 32],
}

impl fmt::Debug for Pseudonymizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pseudonymizer(..)")
    }
}

impl Pseudonymizer {
    /// Derives the symmetric key as the SHA-256 digest of the secret material.
    pub fn derive(secret: &[u8]) -> Self {
        let digest = Sha256::digest(secret);
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encodes an identifier into its token.
    pub fn encode(&self, plaintext: &str) -> String {
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &FIXED_IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        STANDARD.encode(ciphertext)
    }

    /// Recovers the identifier from a token produced by [`Pseudonymizer::encode`]
    /// under the same key.
    pub fn decode(&self, token: &str) -> Result<String, DecryptionError> {
        let ciphertext = STANDARD
            .decode(token)
            .map_err(|_| DecryptionError::Encoding)?;
        let plaintext = Aes256CbcDec::new(&self.key.into(), &FIXED_IV.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| DecryptionError::Padding)?;
        String::from_utf8(plaintext).map_err(|_| DecryptionError::Utf8)
    }

    /// Returns true when `token` decodes under this key.
    pub fn recognizes(&self, token: &str) -> bool {
        self.decode(token).is_ok()
    }
}
