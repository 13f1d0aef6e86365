//! Client half of the user pool's Secure Remote Password login.
//!
//! The password never leaves the process: the client sends `A`, the pool
//! answers with `B`, a salt and a secret block, and the client proves it
//! knows the password by signing the secret block with the shared key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use num_bigint::BigUint;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::SrpError;

type HmacSha256 = Hmac<Sha256>;

/// RFC 3526 3072-bit MODP group.
const N_HEX: &str = "\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DD\
EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
15728E5A8AAAC42DAD33170D04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7\
ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C\
BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF";
const G: u32 = 2;
const DERIVED_KEY_INFO: &[u8] = b"Caldera Derived Key";
const TIMESTAMP_FORMAT: &str = "%a %b %-d %H:%M:%S UTC %Y";

lazy_static! {
    static ref N: BigUint = BigUint::parse_bytes(N_HEX.as_bytes(), 16).expect("group prime is valid hex");
    static ref K: BigUint = BigUint::from_bytes_be(&Sha256::digest(
        [pad_bytes(&N), pad_bytes(&BigUint::from(G))].concat()
    ));
}

/// Challenge parameters of a PASSWORD_VERIFIER challenge.
#[derive(Debug, Clone)]
pub struct PasswordVerifier<'a> {
    pub user_id: &'a str,
    pub salt: &'a str,
    pub srp_b: &'a str,
    pub secret_block: &'a str,
}

/// Signed answer to a PASSWORD_VERIFIER challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordClaim {
    pub username: String,
    pub timestamp: String,
    pub secret_block: String,
    pub signature: String,
}

pub struct SrpClient {
    pool_name: String,
    a: BigUint,
    big_a: BigUint,
}

impl SrpClient {
    /// `pool_id` is the full user pool id, e.g. `eu-west-1_AbCdEf`.
    pub fn new(pool_id: &str) -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 128];
            rng.fill_bytes(&mut bytes);
            let a = BigUint::from_bytes_be(&bytes) % &*N;
            if a != BigUint::default() {
                return Self::with_private(pool_id, a);
            }
        }
    }

    fn with_private(pool_id: &str, a: BigUint) -> Self {
        let pool_name = pool_id.split_once('_').map_or(pool_id, |(_, name)| name).to_string();
        let big_a = BigUint::from(G).modpow(&a, &N);
        SrpClient { pool_name, a, big_a }
    }

    /// `SRP_A` as sent in the initial auth request.
    pub fn public_hex(&self) -> String {
        format!("{:x}", self.big_a)
    }

    pub fn password_claim(
        &self,
        challenge: &PasswordVerifier<'_>,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<PasswordClaim, SrpError> {
        let big_b = parse_hex("SRP_B", challenge.srp_b)?;
        let key = self.derive_key(&big_b, challenge.salt, challenge.user_id, password)?;
        let secret_block = BASE64.decode(challenge.secret_block)?;
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();

        let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| SrpError::IllegalParameter("derived key"))?;
        mac.update(self.pool_name.as_bytes());
        mac.update(challenge.user_id.as_bytes());
        mac.update(&secret_block);
        mac.update(timestamp.as_bytes());

        Ok(PasswordClaim {
            username: challenge.user_id.to_string(),
            timestamp,
            secret_block: challenge.secret_block.to_string(),
            signature: BASE64.encode(mac.finalize().into_bytes()),
        })
    }

    fn derive_key(&self, big_b: &BigUint, salt: &str, user_id: &str, password: &str) -> Result<[u8; 16], SrpError> {
        let u = scrambler(&self.big_a, big_b);
        let premaster = self.premaster_secret(big_b, &u, salt, user_id, password)?;

        let hk = Hkdf::<Sha256>::new(Some(&pad_bytes(&u)), &pad_bytes(&premaster));
        let mut key = [0u8; 16];
        hk.expand(DERIVED_KEY_INFO, &mut key)
            .map_err(|_| SrpError::IllegalParameter("derived key"))?;
        Ok(key)
    }

    fn premaster_secret(
        &self,
        big_b: &BigUint,
        u: &BigUint,
        salt: &str,
        user_id: &str,
        password: &str,
    ) -> Result<BigUint, SrpError> {
        let zero = BigUint::default();
        if big_b % &*N == zero {
            return Err(SrpError::IllegalParameter("SRP_B"));
        }
        if *u == zero {
            return Err(SrpError::IllegalParameter("scrambler"));
        }

        let x = private_key(&self.pool_name, user_id, password, salt)?;
        let k_gx = &*K * BigUint::from(G).modpow(&x, &N) % &*N;
        let base = (big_b % &*N + &*N - k_gx) % &*N;
        Ok(base.modpow(&(&self.a + u * &x), &N))
    }
}

/// `x = H(salt | H(pool_name | user_id ":" password))`
fn private_key(pool_name: &str, user_id: &str, password: &str, salt: &str) -> Result<BigUint, SrpError> {
    let identity = Sha256::digest(format!("{pool_name}{user_id}:{password}").as_bytes());
    let salt = hex::decode(pad_hex(salt)).map_err(|_| SrpError::IllegalParameter("SALT"))?;
    Ok(BigUint::from_bytes_be(&Sha256::digest([salt.as_slice(), identity.as_slice()].concat())))
}

/// `u = H(pad(A) | pad(B))`
fn scrambler(big_a: &BigUint, big_b: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&Sha256::digest([pad_bytes(big_a), pad_bytes(big_b)].concat()))
}

fn parse_hex(name: &'static str, value: &str) -> Result<BigUint, SrpError> {
    BigUint::parse_bytes(value.as_bytes(), 16).ok_or(SrpError::IllegalParameter(name))
}

/// Two's-complement style padding: even length, and a leading zero byte
/// when the high bit is set so the value never reads as negative.
fn pad_hex(hex: &str) -> String {
    if hex.len() % 2 == 1 {
        format!("0{hex}")
    } else if hex.starts_with(|c: char| matches!(c, '8'..='9' | 'a'..='f' | 'A'..='F')) {
        format!("00{hex}")
    } else {
        hex.to_string()
    }
}

fn pad_bytes(n: &BigUint) -> Vec<u8> {
    hex::decode(pad_hex(&format!("{n:x}"))).expect("formatted hex decodes")
}
