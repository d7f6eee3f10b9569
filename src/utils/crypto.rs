//! XChaCha20-Poly1305 session cipher.
//!
//! Once login negotiates a key, every frame body is sealed independently:
//! a random 24-byte nonce is prepended to the ciphertext. Random nonces
//! keep the two directions free of shared counter state, and a 24-byte
//! nonce space makes collisions a non-concern at session volumes.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use zeroize::Zeroize;

use crate::error::CodecError;

/// Length of the nonce prepended to each sealed frame body.
pub const NONCE_LEN: usize = 24;

/// Per-session frame cipher. Created once during login from the key the
/// exchange derived; fixed for the session's remaining lifetime.
pub struct Cipher {
    inner: XChaCha20Poly1305,
}

impl Cipher {
    /// Build a cipher from a derived session key. The caller's key copy is
    /// zeroized here so it does not linger on the stack.
    pub fn new(mut key: [u8; 32]) -> Self {
        let inner = XChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();
        Self { inner }
    }

    /// Seal a frame body: returns `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .inner
            .encrypt(&nonce, plaintext)
            .map_err(|_| CodecError::EncryptionFailure)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a sealed frame body produced by [`Cipher::seal`].
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        if data.len() < NONCE_LEN {
            return Err(CodecError::DecryptionFailure);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.inner
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::DecryptionFailure)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = Cipher::new([7u8; 32]);
        let sealed = cipher.seal(b"hello frames").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"hello frames");
        let opened = cipher.open(&sealed).unwrap();
        assert_eq!(opened, b"hello frames");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = Cipher::new([7u8; 32]);
        let mut sealed = cipher.seal(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            cipher.open(&sealed),
            Err(CodecError::DecryptionFailure)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealed = Cipher::new([1u8; 32]).seal(b"payload").unwrap();
        assert!(matches!(
            Cipher::new([2u8; 32]).open(&sealed),
            Err(CodecError::DecryptionFailure)
        ));
    }

    #[test]
    fn test_short_input_rejected() {
        let cipher = Cipher::new([7u8; 32]);
        assert!(cipher.open(&[0u8; 10]).is_err());
    }
}
