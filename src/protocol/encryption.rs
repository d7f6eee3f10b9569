//! Login key exchange.
//!
//! During `Login` the server offers an ephemeral x25519 public key and a
//! nonce; the client answers with its own public key and both sides derive
//! the session key as SHA-256 over the shared secret and the nonce. The
//! derived key feeds the wire codec's cipher for the rest of the session.
//!
//! Both halves live here: the engine uses the client half, and test
//! harnesses (or anything else standing in for a server) use the server
//! half to negotiate a matching key.

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};

/// Derive the session key from the shared secret and the exchange nonce.
/// Labelled hashing keeps this derivation domain-separated from any other
/// SHA-256 use.
fn derive_session_key(shared: &SharedSecret, nonce: &[u8; 16]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"session-key");
    hasher.update(shared.as_bytes());
    hasher.update(b"nonce");
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Client half: answer an `EncryptionRequest`.
///
/// Returns the public key to send back and the derived session key. The
/// ephemeral secret never leaves this function; `EphemeralSecret` zeroizes
/// itself on drop.
pub fn client_respond(server_public: [u8; 32], nonce: [u8; 16]) -> ([u8; 32], [u8; 32]) {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let shared = secret.diffie_hellman(&PublicKey::from(server_public));
    (public.to_bytes(), derive_session_key(&shared, &nonce))
}

/// Server-side exchange state between offering a key and hearing back.
pub struct ServerKeyExchange {
    secret: EphemeralSecret,
    nonce: [u8; 16],
}

impl ServerKeyExchange {
    /// Start an exchange: generate the keypair and nonce for an
    /// `EncryptionRequest`.
    pub fn initiate() -> (Self, [u8; 32], [u8; 16]) {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret).to_bytes();
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);
        (Self { secret, nonce }, public, nonce)
    }

    /// Finish the exchange with the client's public key.
    pub fn finalize(self, client_public: [u8; 32]) -> [u8; 32] {
        let shared = self.secret.diffie_hellman(&PublicKey::from(client_public));
        derive_session_key(&shared, &self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_sides_derive_same_key() {
        let (server, server_public, nonce) = ServerKeyExchange::initiate();
        let (client_public, client_key) = client_respond(server_public, nonce);
        let server_key = server.finalize(client_public);
        assert_eq!(client_key, server_key);
    }

    #[test]
    fn test_exchanges_are_independent() {
        let (s1, p1, n1) = ServerKeyExchange::initiate();
        let (s2, p2, n2) = ServerKeyExchange::initiate();
        assert_ne!(p1, p2);
        assert_ne!(n1, n2);

        let (c1, k1) = client_respond(p1, n1);
        let (c2, k2) = client_respond(p2, n2);
        assert_ne!(k1, k2);
        assert_eq!(s1.finalize(c1), k1);
        assert_eq!(s2.finalize(c2), k2);
    }
}
