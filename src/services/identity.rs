//! Verifies access tokens issued by the identity provider (Supabase auth).

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::account::IdentityProfile;

pub const SUPABASE_AUDIENCE: &str = "authenticated";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider is not configured")]
    NotConfigured,
    #[error("identity token rejected: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("identity token subject is not a valid id")]
    InvalidSubject,
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
    picture: Option<String>,
}

#[derive(Clone)]
pub struct IdentityVerifier {
    key: Option<DecodingKey>,
}

impl std::fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifier")
            .field("configured", &self.key.is_some())
            .finish()
    }
}

impl IdentityVerifier {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            key: secret
                .filter(|s| !s.is_empty())
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
        }
    }

    pub fn verify(&self, token: &str) -> Result<IdentityProfile, IdentityError> {
        let key = self.key.as_ref().ok_or(IdentityError::NotConfigured)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        validation.required_spec_claims.insert("exp".to_string());
        let data = decode::<IdentityClaims>(token, key, &validation)?;
        let claims = data.claims;

        let id = Uuid::parse_str(&claims.sub).map_err(|_| IdentityError::InvalidSubject)?;
        let meta = claims.user_metadata;

        Ok(IdentityProfile {
            id,
            email: claims.email.unwrap_or_default(),
            name: meta.full_name.or(meta.name).unwrap_or_default(),
            profile_picture: meta.avatar_url.or(meta.picture),
        })
    }
}
