use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use order_engine::db_types::{Principal, Role};
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

/// The claims carried by an access token. The identity provider vouches for the user id (`sub`) and the role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: i64,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl JwtClaims {
    pub fn new(user_id: i64, role: Role, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self { sub: user_id, role, iat: now.timestamp(), exp: (now + lifetime).timestamp() }
    }

    pub fn principal(&self) -> Principal {
        Principal { user_id: self.sub, role: self.role }
    }
}

/// Handlers take `JwtClaims` as an argument to receive the caller's validated claims. The claims are put in place by
/// [`crate::middleware::JwtMiddlewareFactory`], so the extractor fails with a 401 on routes outside its scope.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned();
        ready(claims.ok_or(ServerError::AuthenticationError(AuthError::MissingToken)))
    }
}

/// Validates HS256 access tokens.
#[derive(Clone)]
pub struct JwtAuthority {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        let key = DecodingKey::from_secret(config.jwt_secret.reveal().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self { key, validation }
    }

    /// Validates a raw token, or the value of an `Authorization: Bearer <token>` header.
    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            JwtErrorKind::InvalidToken | JwtErrorKind::Base64(_) | JwtErrorKind::Json(_) | JwtErrorKind::Utf8(_) => {
                AuthError::PoorlyFormattedToken(e.to_string())
            },
            _ => AuthError::ValidationError(e.to_string()),
        })?;
        trace!("🔐️ Access token validated for user {}", data.claims.sub);
        Ok(data.claims)
    }
}

/// Issues access tokens signed with the server's secret. In production, tokens are minted by the identity provider
/// that shares the secret; this is used by tooling and tests.
pub struct TokenIssuer {
    key: EncodingKey,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let key = EncodingKey::from_secret(config.jwt_secret.reveal().as_bytes());
        Self { key, lifetime: config.token_lifetime }
    }

    pub fn issue_token(&self, principal: &Principal, lifetime: Option<Duration>) -> Result<String, AuthError> {
        let claims = JwtClaims::new(principal.user_id, principal.role, lifetime.unwrap_or(self.lifetime));
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.key).map_err(|e| AuthError::CouldNotIssueToken(e.to_string()))
    }
}
