//! The ECDSA signing capability and WIF private-key encoding (§4.B).
//!
//! spec.md treats the ECDSA primitive itself as an abstract capability
//! (`{keygen, multiply_point, add_scalar, sign, public_from_private}`); this
//! module is that capability's one concrete implementation, backed by
//! `secp256k1`, plus the WIF (`base58check`) private-key wire format the
//! wallet persists keys in and the stealth-address monitor's scalar/point
//! arithmetic (§4.H) is built on.

use lazy_static::lazy_static;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signature};

use crate::parameters::Network;
use crate::serialization::SerializationError;

lazy_static! {
    /// The shared secp256k1 context. Thread safety is the primitive's own
    /// responsibility, per spec.md §9 ("OpenSSL global state"); this crate
    /// never touches thread-local global state of its own.
    static ref SECP256K1: Secp256k1<secp256k1::All> = Secp256k1::new();
}

/// `keygen`: a fresh, uniformly random keypair.
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let mut rng = rand::rngs::OsRng;
    SECP256K1.generate_keypair(&mut rng)
}

/// `public_from_private`.
pub fn public_from_private(secret: &SecretKey) -> PublicKey {
    PublicKey::from_secret_key(&SECP256K1, secret)
}

/// `sign`: a deterministic (RFC 6979) ECDSA signature over a 32-byte digest.
pub fn sign(secret: &SecretKey, digest: &[u8; 32]) -> Result<Signature, secp256k1::Error> {
    let message = Message::from_slice(digest)?;
    Ok(SECP256K1.sign(&message, secret))
}

/// `multiply_point`: scalar multiplication of a point by a private scalar,
/// i.e. `scalar * point`. Used by the stealth-address monitor to compute
/// the shared secret `d*E` and the one-time public key `d*G + h*G`.
pub fn multiply_point(point: &PublicKey, scalar: &SecretKey) -> PublicKey {
    let mut point = *point;
    point
        .mul_assign(&SECP256K1, &scalar[..])
        .expect("a valid non-zero scalar never fails point multiplication");
    point
}

/// `add_scalar`: `a + b mod n`, used for both deriving `d*G + h*G` (as a
/// public-key combination) and the stealth one-time private key `d + h`.
pub fn add_scalar(a: &SecretKey, b: &SecretKey) -> Result<SecretKey, secp256k1::Error> {
    let mut a = *a;
    a.add_assign(&b[..])?;
    Ok(a)
}

/// Point addition, `P + Q`, used to compute the stealth one-time address
/// `d*G + h*G` from its two summand public keys.
pub fn add_points(a: &PublicKey, b: &PublicKey) -> Result<PublicKey, secp256k1::Error> {
    a.combine(b)
}

/// A private key together with the network and serialization form (WIF)
/// that determines how it base58check-encodes, matching Bitcoin's
/// convention of binding those choices to the key at creation time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PrivateKey {
    pub secret: SecretKey,
    pub network: Network,
    pub compressed: bool,
}

mod wif_magics {
    pub const MAINNET: u8 = 0x80;
    pub const TESTNET: u8 = 0xef;
    /// Appended after the 32-byte scalar when the derived public key should
    /// be serialized in compressed form.
    pub const COMPRESSED_SUFFIX: u8 = 0x01;
}

impl PrivateKey {
    pub fn new(secret: SecretKey, network: Network, compressed: bool) -> PrivateKey {
        PrivateKey { secret, network, compressed }
    }

    pub fn public_key(&self) -> PublicKey {
        public_from_private(&self.secret)
    }

    /// Encode this key as WIF: `base58check(version || scalar || [0x01 if
    /// compressed])` (§6 "Address codec").
    pub fn to_wif(&self) -> String {
        let version = match self.network {
            Network::Mainnet => wif_magics::MAINNET,
            Network::Testnet => wif_magics::TESTNET,
        };
        let mut payload = Vec::with_capacity(34);
        payload.push(version);
        payload.extend_from_slice(&self.secret[..]);
        if self.compressed {
            payload.push(wif_magics::COMPRESSED_SUFFIX);
        }
        bs58::encode(payload).with_check().into_string()
    }

    pub fn from_wif(s: &str) -> Result<PrivateKey, SerializationError> {
        let bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| SerializationError::Parse("invalid WIF checksum/alphabet"))?;
        let (version, rest) = bytes
            .split_first()
            .ok_or(SerializationError::Parse("empty WIF payload"))?;
        let network = match *version {
            wif_magics::MAINNET => Network::Mainnet,
            wif_magics::TESTNET => Network::Testnet,
            _ => return Err(SerializationError::Parse("unrecognized WIF version byte")),
        };
        let compressed = match rest.len() {
            32 => false,
            33 if rest[32] == wif_magics::COMPRESSED_SUFFIX => true,
            _ => return Err(SerializationError::Parse("bad WIF payload length")),
        };
        let secret = SecretKey::from_slice(&rest[..32])
            .map_err(|_| SerializationError::Parse("invalid secp256k1 scalar"))?;
        Ok(PrivateKey { secret, network, compressed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // spec.md §8 scenario 2: private scalar 0x00...01.
    fn scalar_one() -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SecretKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn wif_compressed_matches_spec_vector() {
        spv_test::init();
        let key = PrivateKey::new(scalar_one(), Network::Mainnet, true);
        assert_eq!(key.to_wif(), "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn");
    }

    #[test]
    fn wif_uncompressed_matches_spec_vector() {
        spv_test::init();
        let key = PrivateKey::new(scalar_one(), Network::Mainnet, false);
        assert_eq!(key.to_wif(), "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf");
    }

    #[test]
    fn wif_roundtrips() {
        spv_test::init();
        let key = PrivateKey::new(scalar_one(), Network::Testnet, true);
        let parsed = PrivateKey::from_wif(&key.to_wif()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn address_matches_spec_vector() {
        spv_test::init();
        use super::address::ToAddressWithNetwork;
        let key = PrivateKey::new(scalar_one(), Network::Mainnet, true);
        let addr = key.public_key().to_address(Network::Mainnet);
        assert_eq!(addr.to_string(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");

        let uncompressed = PrivateKey::new(scalar_one(), Network::Mainnet, false);
        let addr = uncompressed.public_key().to_address_uncompressed(Network::Mainnet);
        assert_eq!(addr.to_string(), "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm");
    }
}
