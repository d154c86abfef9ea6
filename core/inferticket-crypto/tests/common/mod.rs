//! Shared test helpers: an in-process issuer holding a real RSA key.

#![allow(dead_code)]

use blind_rsa_signatures::{KeyPair, Options};
use inferticket_crypto::{IssuerPublicKey, TokenRequest};
use rand::rngs::OsRng;
use std::sync::OnceLock;

/// Returns a 2048-bit key pair, generated once per test binary.
pub fn issuer_keypair() -> &'static KeyPair {
    static KEYPAIR: OnceLock<KeyPair> = OnceLock::new();
    KEYPAIR.get_or_init(|| KeyPair::generate(&mut OsRng, 2048).unwrap())
}

/// Returns a second, unrelated key pair.
pub fn other_keypair() -> &'static KeyPair {
    static KEYPAIR: OnceLock<KeyPair> = OnceLock::new();
    KEYPAIR.get_or_init(|| KeyPair::generate(&mut OsRng, 2048).unwrap())
}

/// DER encoding of the issuer public key.
pub fn issuer_der() -> Vec<u8> {
    issuer_keypair().pk.to_der().unwrap()
}

/// The issuer public key as the client sees it.
pub fn issuer_key() -> IssuerPublicKey {
    IssuerPublicKey::from_der(&issuer_der()).unwrap()
}

/// Signs a blinded message the way the remote issuer does.
pub fn sign_with(keypair: &KeyPair, request: &TokenRequest) -> Vec<u8> {
    keypair
        .sk
        .blind_sign(&mut OsRng, request.blinded_msg(), &Options::default())
        .unwrap()
        .0
}

/// Signs with the default issuer key.
pub fn sign(request: &TokenRequest) -> Vec<u8> {
    sign_with(issuer_keypair(), request)
}
