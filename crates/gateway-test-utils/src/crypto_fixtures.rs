//! Signing key fixtures for testing
//!
//! Each fixture can sign tokens and describe itself as a published JWK, so a
//! test can serve exactly the key set it signs with.
//!
//! - [`RsaTestKey`] - fixed 2048-bit RSA key (RS256)
//! - [`EcP384TestKey`] - fresh P-384 key per call (ES384)
//! - [`Ed25519TestKey`] - deterministic Ed25519 key from a seed (EdDSA)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P384_SHA384_FIXED_SIGNING,
};
use serde_json::{json, Value};

/// A private key that signs test tokens and publishes a matching JWK.
pub trait TestSigningKey {
    /// Key id placed in token headers and the JWK.
    fn kid(&self) -> &str;

    /// Default signing algorithm.
    fn algorithm(&self) -> Algorithm;

    /// Private key for `jsonwebtoken::encode`.
    fn encoding_key(&self) -> &EncodingKey;

    /// Public JWK as served by the identity provider.
    fn jwk(&self) -> Value;
}

/// Base64url without padding, as used throughout JOSE.
pub fn b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// JWKS document publishing the given keys.
pub fn jwks_json(keys: &[&dyn TestSigningKey]) -> Value {
    json!({
        "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>()
    })
}

/// Token with `alg: none` and an empty signature.
pub fn unsigned_token(kid: &str, claims: &Value) -> String {
    let header = json!({ "alg": "none", "typ": "JWT", "kid": kid });
    format!(
        "{}.{}.",
        b64url(header.to_string().as_bytes()),
        b64url(claims.to_string().as_bytes())
    )
}

// =========================================================================
// RSA
// =========================================================================

const RSA_PRIVATE_KEY_PEM: &str = include_str!("fixtures/rsa_test_key.pem");

/// Public modulus of `fixtures/rsa_test_key.pem`, base64url.
const RSA_MODULUS: &str = "sd0VIfQQLbw_RLtcP3_WA3m5Ze13GQXnhNF8UXBmepvIzZ1cdV660PCpwwANOpDa2awnKltGvsaciirXLTQDe9OJtTGwUaey9w2L-hf3v68a7k_rX_V675DedDEgQ5Xh3SyMZW2Ni0JIi7YrSpLy_YKZyM-q9M7BtVL9SZumGn-3sJLl2AkTgv7Fn-ShMxYnwqOH0xIwIb0mfWXzmJehAYk7VGCEl1Rrzi6nqO6VFyYTX8xpVCtjT3_Y5kfR-wVgIxa55woi_RqiYLz0OJQtp5c8QE_sNLX5qEW24UYmfUw_fCN8_dWlZfoaPIJ88KhqjLjLr4jozfTLcVA8p3VUgQ";

/// Public exponent (65537), base64url.
const RSA_EXPONENT: &str = "AQAB";

/// RSA key backed by a fixed PEM fixture.
///
/// Generating RSA keys at test time is slow, so every instance shares the
/// same key material; only the `kid` differs.
pub struct RsaTestKey {
    kid: String,
    encoding_key: EncodingKey,
}

impl RsaTestKey {
    pub fn new(kid: &str) -> Self {
        let encoding_key = EncodingKey::from_rsa_pem(RSA_PRIVATE_KEY_PEM.as_bytes())
            .expect("RSA fixture PEM should parse");

        Self {
            kid: kid.to_string(),
            encoding_key,
        }
    }
}

impl TestSigningKey for RsaTestKey {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::RS256
    }

    fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "alg": "RS256",
            "use": "sig",
            "n": RSA_MODULUS,
            "e": RSA_EXPONENT,
        })
    }
}

// =========================================================================
// ECDSA P-384
// =========================================================================

/// ECDSA P-384 key, freshly generated.
///
/// Two keys generated with the same `kid` are different keys, which is what
/// signature-mismatch tests want.
pub struct EcP384TestKey {
    kid: String,
    encoding_key: EncodingKey,
    x: Vec<u8>,
    y: Vec<u8>,
}

impl EcP384TestKey {
    pub fn generate(kid: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P384_SHA384_FIXED_SIGNING, &rng)
            .expect("P-384 key generation should succeed");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .expect("Generated PKCS#8 should load");

        // Uncompressed point: 0x04 || x (48 bytes) || y (48 bytes)
        let point = key_pair.public_key().as_ref();
        assert_eq!(point.len(), 97, "P-384 public key should be uncompressed");
        let (x, y) = point[1..].split_at(48);

        Self {
            kid: kid.to_string(),
            encoding_key: EncodingKey::from_ec_der(pkcs8.as_ref()),
            x: x.to_vec(),
            y: y.to_vec(),
        }
    }
}

impl TestSigningKey for EcP384TestKey {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ES384
    }

    fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "EC",
            "kid": self.kid,
            "alg": "ES384",
            "use": "sig",
            "crv": "P-384",
            "x": b64url(&self.x),
            "y": b64url(&self.y),
        })
    }
}

// =========================================================================
// Ed25519
// =========================================================================

/// Deterministic Ed25519 key.
///
/// The same seed always produces the same keypair, ensuring test reproducibility.
pub struct Ed25519TestKey {
    kid: String,
    encoding_key: EncodingKey,
    public_key: Vec<u8>,
}

impl Ed25519TestKey {
    pub fn from_seed(seed: u8, kid: &str) -> Self {
        // Create deterministic 32-byte seed from input
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        // Fill rest with deterministic pattern
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            encoding_key: EncodingKey::from_ed_der(&build_pkcs8_from_seed(&seed_bytes)),
            public_key: key_pair.public_key().as_ref().to_vec(),
        }
    }

    /// Raw 32-byte public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl TestSigningKey for Ed25519TestKey {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }

    fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": b64url(&self.public_key),
            "alg": "EdDSA",
            "use": "sig",
        })
    }
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // PKCS#8 v1 format for Ed25519 (RFC 5208):
    // SEQUENCE {
    //   version         INTEGER (0),
    //   algorithm       AlgorithmIdentifier,
    //   privateKey      OCTET STRING
    // }
    // Where privateKey for Ed25519 is:
    // OCTET STRING containing OCTET STRING with 32-byte seed

    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // AlgorithmIdentifier with OID 1.3.101.112 (Ed25519)
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // privateKey: OCTET STRING (34) wrapping OCTET STRING (32) with the seed
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
