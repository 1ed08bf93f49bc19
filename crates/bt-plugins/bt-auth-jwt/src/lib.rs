//! # bt-auth-jwt
//!
//! HS256 implementation of `IdentityProvider`.
//! The identity provider signs a session token; this plugin only verifies
//! it and turns its claims into a `Session`.

use async_trait::async_trait;
use bt_core::models::Session;
use bt_core::traits::IdentityProvider;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// The user id.
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl From<SessionClaims> for Session {
    fn from(claims: SessionClaims) -> Self {
        Session {
            uid: claims.sub,
            email: claims.email,
            display_name: claims.name,
        }
    }
}

pub struct JwtIdentityProvider {
    secret: SecretString,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwtIdentityProvider {
    pub fn new(secret: SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            secret,
            validation,
            issuer: None,
            audience: None,
        }
    }

    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.validation.set_issuer(&[issuer.as_str()]);
        self.issuer = Some(issuer);
        self
    }

    pub fn with_audience(mut self, audience: String) -> Self {
        self.validation.set_audience(&[audience.as_str()]);
        self.validation.validate_aud = true;
        self.audience = Some(audience);
        self
    }

    /// Signs a session token valid for `validity`. Used for local sign-in
    /// during development and by tests.
    pub fn issue(&self, session: &Session, validity: Duration) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: session.uid.clone(),
            email: session.email.clone(),
            name: session.display_name.clone(),
            iat: now.timestamp(),
            exp: (now + validity).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> anyhow::Result<Option<Session>> {
        match decode::<SessionClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(Some(data.claims.into())),
            Err(err) if matches!(err.kind(), ErrorKind::InvalidKeyFormat) => Err(err.into()),
            Err(err) => {
                debug!(error = %err, "session token rejected");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> JwtIdentityProvider {
        JwtIdentityProvider::new(SecretString::from("test_secret_key_1234567890".to_string()))
            .with_issuer("https://idp.example".into())
    }

    fn session() -> Session {
        Session {
            uid: "u-123".into(),
            email: "fan@example.com".into(),
            display_name: Some("八村ファン".into()),
        }
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let provider = provider();
        let token = provider.issue(&session(), Duration::hours(1)).unwrap();
        assert_eq!(provider.verify(&token).await.unwrap(), Some(session()));
    }

    #[tokio::test]
    async fn test_expired_token_is_no_session() {
        let provider = provider();
        let token = provider.issue(&session(), Duration::hours(-2)).unwrap();
        assert_eq!(provider.verify(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_tokens_are_rejected() {
        let other = JwtIdentityProvider::new(SecretString::from("someone_else".to_string()))
            .with_issuer("https://idp.example".into());
        let token = other.issue(&session(), Duration::hours(1)).unwrap();
        assert_eq!(provider().verify(&token).await.unwrap(), None);

        let secret = SecretString::from("test_secret_key_1234567890".to_string());
        let wrong_issuer =
            JwtIdentityProvider::new(secret).with_issuer("https://evil.example".into());
        let token = wrong_issuer.issue(&session(), Duration::hours(1)).unwrap();
        assert_eq!(provider().verify(&token).await.unwrap(), None);

        assert_eq!(provider().verify("not-a-jwt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_audience_is_checked_when_configured() {
        let provider = provider().with_audience("basket-talk".into());
        let token = provider.issue(&session(), Duration::hours(1)).unwrap();
        assert!(provider.verify(&token).await.unwrap().is_some());

        let elsewhere = self::provider().with_audience("other-app".into());
        let token = elsewhere.issue(&session(), Duration::hours(1)).unwrap();
        assert_eq!(provider.verify(&token).await.unwrap(), None);
    }
}
