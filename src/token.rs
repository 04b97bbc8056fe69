use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::err::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Operator name.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: TokenKind,
}

/// Why a presented token was refused. Callers collapse all of these into a
/// single outward error kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidToken {
    Malformed(String),
    Expired,
    MissingSubject,
    WrongKind,
}

/// Signs and checks HMAC JWTs. Access and refresh tokens use the same
/// primitive and only differ by lifetime and `typ`.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        Self {
            algorithm: config.algorithm,
            encoding: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret_key.as_bytes()),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<String, Error> {
        self.issue_with_ttl(subject, kind, self.ttl(kind))
    }

    pub fn issue_with_ttl(
        &self,
        subject: &str,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl.num_seconds(),
            jti: token_id(),
            typ: kind,
        };
        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding)?)
    }

    /// Checks signature, expiry (`now >= exp` is expired), subject presence
    /// and token kind.
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<Claims, InvalidToken> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => InvalidToken::Expired,
                _ => InvalidToken::Malformed(err.to_string()),
            })?
            .claims;

        if Utc::now().timestamp() >= claims.exp {
            return Err(InvalidToken::Expired);
        }
        if claims.sub.is_empty() {
            return Err(InvalidToken::MissingSubject);
        }
        if claims.typ != kind {
            return Err(InvalidToken::WrongKind);
        }
        Ok(claims)
    }
}

fn token_id() -> String {
    let bytes: [u8; 32] = thread_rng().gen();
    let mut hasher: Sha256 = Digest::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
