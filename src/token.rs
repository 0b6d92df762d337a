//! Manage json web tokens.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServerError};

const LEEWAY: u64 = 5; // seconds.

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the instance that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
}

impl Claims {
    /// Subject as a user identifier.
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| ServerError::InvalidToken)
    }
}

/// Manage signed session tokens (HS256).
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    expiration: u64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`].
    pub fn new(issuer: &str, secret: &str, expiration: u64) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_owned(),
            expiration,
        }
    }

    /// Create a new [`jsonwebtoken`] for `user_id`.
    pub fn create(&self, user_id: &Uuid) -> Result<String> {
        let now = chrono::Utc::now().timestamp() as u64;
        self.sign(&Claims {
            exp: now + self.expiration,
            iat: now,
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|err| ServerError::internal("cannot sign token", err))
    }

    /// Decode and check a token.
    ///
    /// Bad signature, malformed payload, foreign issuer and expiry all
    /// fail with [`ServerError::InvalidToken`].
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = LEEWAY;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                if !matches!(err.kind(), ErrorKind::ExpiredSignature) {
                    tracing::debug!(error = %err, "rejected session token");
                }
                ServerError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "https://dorado.test/";

    #[test]
    fn test_round_trip_carries_user() {
        let manager = TokenManager::new(ISSUER, "secret", 60);
        let id = Uuid::new_v4();

        let token = manager.create(&id).unwrap();
        let claims = manager.decode(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), id);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp, claims.iat + 60);
    }

    #[test]
    fn test_rejects_other_secret() {
        let token = TokenManager::new(ISSUER, "secret", 60)
            .create(&Uuid::new_v4())
            .unwrap();
        let other = TokenManager::new(ISSUER, "another", 60);

        assert!(matches!(
            other.decode(&token),
            Err(ServerError::InvalidToken)
        ));
    }

    #[test]
    fn test_rejects_expired() {
        let manager = TokenManager::new(ISSUER, "secret", 60);
        let now = chrono::Utc::now().timestamp() as u64;
        let token = manager
            .sign(&Claims {
                exp: now - 3600,
                iat: now - 7200,
                iss: ISSUER.to_owned(),
                sub: Uuid::new_v4().to_string(),
            })
            .unwrap();

        assert!(matches!(
            manager.decode(&token),
            Err(ServerError::InvalidToken)
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let manager = TokenManager::new(ISSUER, "secret", 60);
        assert!(manager.decode("not.a.jwt").is_err());
        assert!(manager.decode("").is_err());
    }
}
