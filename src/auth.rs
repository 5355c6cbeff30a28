use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub jti: String, // token id
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// A raw credential presented on subscribe or API calls. Two schemes feed the
/// same canonical user id; downstream components only ever see the id.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Opaque token resolved through the session backend
    SessionToken(String),
    /// Self-issued signed token (HS256 JWT)
    SignedToken(String),
}

/// Resolves a credential to a canonical user id
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, credential: &Credential) -> AppResult<String>;
}

/// Lookup side of the opaque-session-token scheme
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn user_for_session(&self, token: &str) -> AppResult<Option<String>>;
}

/// In-memory session backend for tests and single-node deployments
#[derive(Default)]
pub struct InMemorySessions {
    sessions: RwLock<HashMap<String, String>>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, token: &str, user_id: &str) {
        self.sessions
            .write()
            .await
            .insert(token.to_string(), user_id.to_string());
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }
}

#[async_trait]
impl SessionBackend for InMemorySessions {
    async fn user_for_session(&self, token: &str) -> AppResult<Option<String>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }
}

/// Verifies both credential schemes and mints signed tokens
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    sessions: Arc<dyn SessionBackend>,
    access_token_ttl_hours: i64,
    issuer: String,
}

impl AuthManager {
    pub fn new(config: &Config, sessions: Arc<dyn SessionBackend>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            sessions,
            access_token_ttl_hours: config.access_token_ttl_hours,
            issuer: config.jwt_issuer.clone(),
        }
    }

    /// Create a signed access token for the user. Returns (token, expiry).
    pub fn create_token(&self, user_id: &str) -> AppResult<(String, i64)> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.access_token_ttl_hours);

        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, exp.timestamp()))
    }

    fn verify_signed_token(&self, token: &str) -> AppResult<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        if data.claims.sub.trim().is_empty() {
            return Err(AppError::auth("Token carries no subject"));
        }
        Ok(data.claims.sub)
    }
}

#[async_trait]
impl CredentialResolver for AuthManager {
    async fn resolve(&self, credential: &Credential) -> AppResult<String> {
        match credential {
            Credential::SignedToken(token) => self.verify_signed_token(token),
            Credential::SessionToken(token) => self
                .sessions
                .user_for_session(token)
                .await?
                .ok_or_else(|| AppError::auth("Unknown or expired session")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: 25,
            allowed_origins: vec![],
            jwt_secret: "unit-test-secret".into(),
            jwt_issuer: "courier".into(),
            access_token_ttl_hours: 1,
        }
    }

    #[tokio::test]
    async fn test_signed_token_roundtrip() {
        let sessions = Arc::new(InMemorySessions::new());
        let auth = AuthManager::new(&test_config(), sessions);

        let (token, _) = auth.create_token("alice").unwrap();
        let user = auth
            .resolve(&Credential::SignedToken(token))
            .await
            .unwrap();
        assert_eq!(user, "alice");
    }

    #[tokio::test]
    async fn test_garbage_signed_token_rejected() {
        let auth = AuthManager::new(&test_config(), Arc::new(InMemorySessions::new()));
        let err = auth
            .resolve(&Credential::SignedToken("not-a-jwt".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Jwt(_)));
    }

    #[tokio::test]
    async fn test_wrong_issuer_rejected() {
        let mut other = test_config();
        other.jwt_issuer = "someone-else".into();
        let foreign = AuthManager::new(&other, Arc::new(InMemorySessions::new()));
        let (token, _) = foreign.create_token("alice").unwrap();

        let auth = AuthManager::new(&test_config(), Arc::new(InMemorySessions::new()));
        assert!(auth
            .resolve(&Credential::SignedToken(token))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_session_token_resolution() {
        let sessions = Arc::new(InMemorySessions::new());
        sessions.insert("opaque-123", "bob").await;
        let auth = AuthManager::new(&test_config(), sessions.clone());

        let user = auth
            .resolve(&Credential::SessionToken("opaque-123".into()))
            .await
            .unwrap();
        assert_eq!(user, "bob");

        sessions.revoke("opaque-123").await;
        let err = auth
            .resolve(&Credential::SessionToken("opaque-123".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
