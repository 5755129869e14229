/// JWT issuance and validation shared by the web and API surfaces
///
/// Tokens are signed with HS256 using a single service secret. An access
/// token authenticates requests; a refresh token can only be exchanged for a
/// new access token.
///
/// ## Usage
///
/// ```rust
/// use crypto_core::jwt::TokenIssuer;
///
/// let issuer = TokenIssuer::new("0123456789abcdef0123456789abcdef", 300, 86_400).unwrap();
/// let pair = issuer.issue_pair(42, "leo").unwrap();
/// let claims = issuer.verify_access(&pair.access).unwrap();
/// assert_eq!(claims.username, "leo");
/// ```
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum secret length accepted for HS256 signing
pub const MIN_SECRET_LEN: usize = 32;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT secret too short: {0} bytes (minimum {MIN_SECRET_LEN})")]
    WeakSecret(usize),

    #[error("Token is expired")]
    Expired,

    #[error("Token is invalid: {0}")]
    Invalid(String),

    #[error("Expected {expected:?} token, got {actual:?}")]
    WrongKind { expected: TokenKind, actual: TokenKind },

    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Author id
    pub sub: String,
    pub username: String,
    pub token_type: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    /// Author id parsed from `sub`
    pub fn author_id(&self) -> Result<i64, TokenError> {
        self.sub
            .parse()
            .map_err(|_| TokenError::Invalid(format!("malformed subject '{}'", self.sub)))
    }
}

/// Access/refresh token pair returned on login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Signs and validates tokens with a shared secret
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenIssuer {
    /// Build an issuer. The secret must be at least 32 bytes.
    pub fn new(
        secret: &str,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret(secret.len()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        })
    }

    /// Lifetime of access tokens in seconds
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    fn issue(&self, author_id: i64, username: &str, kind: TokenKind) -> Result<String, TokenError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: author_id.to_string(),
            username: username.to_string(),
            token_type: kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    pub fn issue_access(&self, author_id: i64, username: &str) -> Result<String, TokenError> {
        self.issue(author_id, username, TokenKind::Access)
    }

    pub fn issue_pair(&self, author_id: i64, username: &str) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue(author_id, username, TokenKind::Access)?,
            refresh: self.issue(author_id, username, TokenKind::Refresh)?,
        })
    }

    /// Validate signature and expiry of a token of either kind
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }

    fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: claims.token_type,
            });
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    /// Claims of a refresh token; the caller re-checks the author before
    /// issuing a new access token
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify_kind(token, TokenKind::Refresh)?;
        tracing::debug!(subject = %claims.sub, "refresh token verified");
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SECRET, 300, 3600).unwrap()
    }

    #[test]
    fn test_rejects_short_secret() {
        let err = TokenIssuer::new("weak", 300, 3600).unwrap_err();
        assert!(matches!(err, TokenError::WeakSecret(4)));
    }

    #[test]
    fn test_accepts_32_byte_secret() {
        assert!(TokenIssuer::new(&"a".repeat(32), 300, 3600).is_ok());
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let pair = issuer.issue_pair(7, "leo").unwrap();

        let claims = issuer.verify_access(&pair.access).unwrap();
        assert_eq!(claims.author_id().unwrap(), 7);
        assert_eq!(claims.username, "leo");
        assert_eq!(claims.token_type, TokenKind::Access);
        assert_eq!(pair.access.matches('.').count(), 2);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let issuer = issuer();
        let pair = issuer.issue_pair(7, "leo").unwrap();

        let err = issuer.verify_access(&pair.refresh).unwrap_err();
        assert!(matches!(err, TokenError::WrongKind { .. }));
    }

    #[test]
    fn test_verify_refresh_accepts_only_refresh_tokens() {
        let issuer = issuer();
        let pair = issuer.issue_pair(7, "leo").unwrap();

        let claims = issuer.verify_refresh(&pair.refresh).unwrap();
        assert_eq!(claims.author_id().unwrap(), 7);
        assert_eq!(claims.username, "leo");

        assert!(matches!(
            issuer.verify_refresh(&pair.access),
            Err(TokenError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::new(SECRET, -3600, -3600).unwrap();
        let token = issuer.issue_access(1, "leo").unwrap();

        assert!(matches!(issuer.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_signature_from_other_secret_rejected() {
        let other = TokenIssuer::new(&"b".repeat(32), 300, 3600).unwrap();
        let token = other.issue_access(1, "leo").unwrap();

        assert!(matches!(issuer().verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(issuer().verify("not.a.token").is_err());
    }
}
