mod common;

use inferticket_crypto::{
    BlindSignatureClient, CryptoError, IssuerPublicKey, Token, TokenRequest, TOKEN_TYPE_BLIND_RSA,
};

// ── Challenge ────────────────────────────────────────────────────

#[test]
fn challenge_is_deterministic() {
    let client = BlindSignatureClient::new();
    let a = client.create_challenge("issuer.example", "inference").unwrap();
    let b = client.create_challenge("issuer.example", "inference").unwrap();
    assert_eq!(a.to_bytes(), b.to_bytes());
    assert_eq!(a.digest(), b.digest());
}

#[test]
fn challenge_layout() {
    let client = BlindSignatureClient::new();
    let challenge = client.create_challenge("iss", "aud").unwrap();
    assert_eq!(
        challenge.to_bytes(),
        vec![0x00, 0x02, 0x00, 0x03, b'i', b's', b's', 0x00, 0x00, 0x03, b'a', b'u', b'd']
    );
    assert_eq!(challenge.token_type(), TOKEN_TYPE_BLIND_RSA);
}

#[test]
fn challenge_rejects_empty_issuer() {
    let client = BlindSignatureClient::new();
    assert!(client.create_challenge("", "aud").is_err());
}

// ── Round trip ───────────────────────────────────────────────────

#[test]
fn blind_sign_finalize_verifies() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();

    let (request, state) = client.create_token_request(&challenge, &key).unwrap();
    let signed = common::sign(&request);
    let token = client.finalize_token(&signed, state).unwrap();

    client.verify_token(&token, &key).unwrap();
    assert_eq!(token.challenge_digest(), challenge.digest());
    assert_eq!(token.token_key_id(), key.key_id());
}

#[test]
fn finalized_token_does_not_contain_blinded_message() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();

    let (request, state) = client.create_token_request(&challenge, &key).unwrap();
    let signed = common::sign(&request);
    let token = client.finalize_token(&signed, state).unwrap();

    assert_ne!(token.authenticator(), signed.as_slice());
    assert_ne!(token.authenticator(), request.blinded_msg());
}

#[test]
fn each_request_uses_fresh_blinding() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();

    let (a, _sa) = client.create_token_request(&challenge, &key).unwrap();
    let (b, _sb) = client.create_token_request(&challenge, &key).unwrap();
    assert_ne!(a.blinded_msg(), b.blinded_msg());
}

#[test]
fn request_serialization_roundtrip() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();
    let (request, _state) = client.create_token_request(&challenge, &key).unwrap();

    let bytes = request.to_bytes();
    assert_eq!(&bytes[..2], &TOKEN_TYPE_BLIND_RSA.to_be_bytes());
    assert_eq!(bytes[2], key.key_id()[31]);
    assert_eq!(TokenRequest::from_bytes(&bytes).unwrap(), request);
}

// ── Failure modes ────────────────────────────────────────────────

#[test]
fn wrong_length_response_is_protocol_error() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();
    let (request, state) = client.create_token_request(&challenge, &key).unwrap();

    let mut signed = common::sign(&request);
    signed.pop();
    let err = client.finalize_token(&signed, state).unwrap_err();
    assert!(matches!(err, CryptoError::Protocol(_)));
}

#[test]
fn response_from_other_key_is_protocol_error() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();
    let (request, state) = client.create_token_request(&challenge, &key).unwrap();

    let signed = common::sign_with(common::other_keypair(), &request);
    let err = client.finalize_token(&signed, state).unwrap_err();
    assert!(matches!(err, CryptoError::Protocol(_)));
}

#[test]
fn response_for_other_request_is_protocol_error() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();
    let (first, _first_state) = client.create_token_request(&challenge, &key).unwrap();
    let (_second, second_state) = client.create_token_request(&challenge, &key).unwrap();

    let signed = common::sign(&first);
    assert!(client.finalize_token(&signed, second_state).is_err());
}

#[test]
fn token_from_other_key_fails_verification() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let other = IssuerPublicKey::from_der(&common::other_keypair().pk.to_der().unwrap()).unwrap();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();

    let (request, state) = client.create_token_request(&challenge, &key).unwrap();
    let token = client.finalize_token(&common::sign(&request), state).unwrap();
    assert!(client.verify_token(&token, &other).is_err());
}

#[test]
fn tampered_token_fails_verification() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();

    let (request, state) = client.create_token_request(&challenge, &key).unwrap();
    let token = client.finalize_token(&common::sign(&request), state).unwrap();

    let mut bytes = token.into_bytes();
    bytes[5] ^= 0xFF;
    let tampered = Token::from_bytes(&bytes).unwrap();
    assert!(client.verify_token(&tampered, &key).is_err());
}

#[test]
fn token_parse_rejects_bad_tag() {
    let mut bytes = vec![0u8; 400];
    bytes[1] = 0x01;
    assert!(matches!(Token::from_bytes(&bytes), Err(CryptoError::Protocol(_))));
    assert!(Token::from_bytes(&[0, 2, 1]).is_err());
}

// ── Public key parsing ───────────────────────────────────────────

#[test]
fn empty_public_key_rejected() {
    assert!(matches!(
        IssuerPublicKey::from_base64("  "),
        Err(CryptoError::InvalidPublicKey(_))
    ));
    assert!(IssuerPublicKey::from_der(&[]).is_err());
}

#[test]
fn garbage_public_key_rejected() {
    assert!(IssuerPublicKey::from_der(b"definitely not der").is_err());
    assert!(IssuerPublicKey::from_base64("%%%").is_err());
}

#[test]
fn blinding_state_debug_is_redacted() {
    let client = BlindSignatureClient::new();
    let key = common::issuer_key();
    let challenge = client.create_challenge("issuer.example", "inference").unwrap();
    let (_request, state) = client.create_token_request(&challenge, &key).unwrap();
    assert!(format!("{state:?}").contains("REDACTED"));
}
