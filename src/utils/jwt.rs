use std::collections::HashSet;

use jsonwebtoken::{
    decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use thiserror::Error;

use crate::routes::auth::claims::Claims;

/// Session tokens are HS256 only; anything else in the header is refused.
const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

pub const MIN_JWT_SECRET_LENGTH: usize = 32;
/// A 32-byte secret made of two or three repeated characters is not a secret.
const MIN_UNIQUE_JWT_BYTES: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JwtSecretError {
    #[error("session signing secret is empty")]
    Missing,
    #[error("session signing secret has {actual} bytes; {required} are required")]
    TooShort { actual: usize, required: usize },
    #[error("session signing secret uses only {actual} distinct bytes; {required} are required")]
    LowEntropy { actual: usize, required: usize },
}

/// Signing and verification halves of the session secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JwtKeys(..)")
    }
}

impl JwtKeys {
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Result<Self, JwtSecretError> {
        let secret = secret.as_ref();
        check_secret(secret)?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Implemented by router state so session extractors can find the keys.
pub trait JwtKeyProvider {
    fn jwt_keys(&self) -> &JwtKeys;
    fn jwt_issuer(&self) -> &str;
    fn jwt_audience(&self) -> &str;
}

fn check_secret(secret: &[u8]) -> Result<(), JwtSecretError> {
    match secret.len() {
        0 => Err(JwtSecretError::Missing),
        len if len < MIN_JWT_SECRET_LENGTH => Err(JwtSecretError::TooShort {
            actual: len,
            required: MIN_JWT_SECRET_LENGTH,
        }),
        _ => {
            let distinct = secret.iter().collect::<HashSet<_>>().len();
            if distinct < MIN_UNIQUE_JWT_BYTES {
                Err(JwtSecretError::LowEntropy {
                    actual: distinct,
                    required: MIN_UNIQUE_JWT_BYTES,
                })
            } else {
                Ok(())
            }
        }
    }
}

fn session_validation(issuer: &str, audience: &str) -> Validation {
    let mut validation = Validation::new(SESSION_ALGORITHM);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    validation.leeway = 0;
    validation
}

/// Stamps `iss` and `aud` onto the claims and signs them.
pub fn create_jwt(
    claims: Claims,
    keys: &JwtKeys,
    issuer: &str,
    audience: &str,
) -> Result<String, Error> {
    let claims = Claims {
        iss: issuer.to_owned(),
        aud: audience.to_owned(),
        ..claims
    };
    encode(&Header::new(SESSION_ALGORITHM), &claims, keys.encoding_key())
}

pub fn decode_jwt(
    token: &str,
    keys: &JwtKeys,
    issuer: &str,
    audience: &str,
) -> Result<TokenData<Claims>, Error> {
    decode::<Claims>(token, keys.decoding_key(), &session_validation(issuer, audience))
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::errors::ErrorKind;
    use time::OffsetDateTime;

    use super::*;
    use crate::models::account::UserRole;
    use crate::routes::auth::claims::SessionKind;

    const SECRET: &str = "k9Fz2LqW8vXc4NpR7tYb1HsD6mJg3AeU";

    fn keys() -> JwtKeys {
        JwtKeys::from_secret(SECRET).unwrap()
    }

    fn session(expires_in: i64) -> Claims {
        Claims {
            sub: "3f0c8f4e-1111-4c3a-9a7e-000000000001".into(),
            email: "user@example.com".into(),
            role: UserRole::User,
            kind: SessionKind::Account,
            exp: OffsetDateTime::now_utc().unix_timestamp() + expires_in,
            iss: String::new(),
            aud: String::new(),
        }
    }

    #[test]
    fn secret_checks() {
        assert_eq!(JwtKeys::from_secret("").unwrap_err(), JwtSecretError::Missing);
        assert_eq!(
            JwtKeys::from_secret("short").unwrap_err(),
            JwtSecretError::TooShort {
                actual: 5,
                required: MIN_JWT_SECRET_LENGTH
            }
        );
        assert_eq!(
            JwtKeys::from_secret("ab".repeat(16)).unwrap_err(),
            JwtSecretError::LowEntropy {
                actual: 2,
                required: MIN_UNIQUE_JWT_BYTES
            }
        );
        assert!(JwtKeys::from_secret(SECRET).is_ok());
    }

    #[test]
    fn issued_token_carries_issuer_and_audience() {
        let keys = keys();
        let token = create_jwt(session(60), &keys, "ledger", "ledger-web").unwrap();
        let data = decode_jwt(&token, &keys, "ledger", "ledger-web").unwrap();
        assert_eq!(data.header.alg, Algorithm::HS256);
        assert_eq!(data.claims.email, "user@example.com");
        assert_eq!(data.claims.iss, "ledger");
        assert_eq!(data.claims.aud, "ledger-web");
    }

    #[test]
    fn foreign_issuer_or_audience_is_refused() {
        let keys = keys();
        let token = create_jwt(session(60), &keys, "ledger", "ledger-web").unwrap();

        let err = decode_jwt(&token, &keys, "ledger", "elsewhere").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidAudience));
        let err = decode_jwt(&token, &keys, "someone", "ledger-web").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidIssuer));
    }

    #[test]
    fn expired_session_is_refused() {
        let keys = keys();
        let token = create_jwt(session(-5), &keys, "ledger", "ledger-web").unwrap();
        let err = decode_jwt(&token, &keys, "ledger", "ledger-web").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn token_signed_with_another_secret_is_refused() {
        let other = JwtKeys::from_secret("Zq7Wm2Xr9Lp4Kd8Vn3Bt6Hc1Jf5Gs0Ya").unwrap();
        let token = create_jwt(session(60), &other, "ledger", "ledger-web").unwrap();
        let err = decode_jwt(&token, &keys(), "ledger", "ledger-web").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSignature));
    }
}
