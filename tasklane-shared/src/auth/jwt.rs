/// JWT issuance and validation
///
/// Tokens are HS256-signed and carry the user, their organization and their
/// role so most requests can be authorized without a database round trip.
///
/// # Token Types
///
/// - **Access**: 24 hours, accepted by the bearer middleware
/// - **Refresh**: 30 days, only accepted by `POST /v1/auth/refresh`
///
/// # Example
///
/// ```
/// use tasklane_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use tasklane_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "an-example-secret-that-is-long-enough";
/// let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), UserRole::Member, TokenType::Access);
/// let token = create_token(&claims, secret)?;
///
/// let validated = validate_access_token(&token, secret)?;
/// assert_eq!(validated.role, UserRole::Member);
/// # Ok(())
/// # }
/// ```
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// `iss` claim of every token
pub const ISSUER: &str = "tasklane";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Expected {expected} token")]
    WrongTokenType { expected: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Token payload
///
/// Standard claims `sub`, `iss`, `iat`, `exp`, `nbf` plus the organization,
/// role and token type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,

    /// Organization ID
    pub org: Uuid,

    /// Role at issuance time
    pub role: UserRole,

    pub token_type: TokenType,
}

impl Claims {
    pub fn new(user_id: Uuid, organization_id: Uuid, role: UserRole, token_type: TokenType) -> Self {
        Self::with_expiration(
            user_id,
            organization_id,
            role,
            token_type,
            token_type.default_expiration(),
        )
    }

    pub fn with_expiration(
        user_id: Uuid,
        organization_id: Uuid,
        role: UserRole,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            org: organization_id,
            role,
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Verifies signature, expiry, `nbf` and issuer, and returns the claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            _ => JwtError::ValidationError(e.to_string()),
        })
}

fn validate_typed(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongTokenType {
            expected: expected.as_str(),
        });
    }

    Ok(claims)
}

pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Access)
}

pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Refresh)
}

/// Access and refresh token returned by register, login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub fn issue_token_pair(
    user_id: Uuid,
    organization_id: Uuid,
    role: UserRole,
    secret: &str,
) -> Result<TokenPair, JwtError> {
    let access = Claims::new(user_id, organization_id, role, TokenType::Access);
    let refresh = Claims::new(user_id, organization_id, role, TokenType::Refresh);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
        token_type: "Bearer".to_string(),
        expires_in: TokenType::Access.default_expiration().num_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn claims(token_type: TokenType) -> Claims {
        Claims::new(Uuid::new_v4(), Uuid::new_v4(), UserRole::Admin, token_type)
    }

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(24));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
    }

    #[test]
    fn test_create_and_validate_token() {
        let original = claims(TokenType::Access);
        let token = create_token(&original, SECRET).unwrap();

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.sub, original.sub);
        assert_eq!(validated.org, original.org);
        assert_eq!(validated.role, UserRole::Admin);
        assert_eq!(validated.iss, ISSUER);
        assert!(!validated.is_expired());
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let token = create_token(&claims(TokenType::Access), SECRET).unwrap();
        assert!(matches!(
            validate_token(&token, "another-secret-key-at-least-32-bytes"),
            Err(JwtError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_expired_token() {
        let expired = Claims::with_expiration(
            Uuid::new_v4(),
            Uuid::new_v4(),
            UserRole::Member,
            TokenType::Access,
            Duration::seconds(-3600),
        );
        assert!(expired.is_expired());

        let token = create_token(&expired, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let mut foreign = claims(TokenType::Access);
        foreign.iss = "someone-else".to_string();

        let token = create_token(&foreign, SECRET).unwrap();
        assert!(matches!(
            validate_token(&token, SECRET),
            Err(JwtError::InvalidIssuer)
        ));
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let refresh = create_token(&claims(TokenType::Refresh), SECRET).unwrap();
        assert!(matches!(
            validate_access_token(&refresh, SECRET),
            Err(JwtError::WrongTokenType { expected: "access" })
        ));
        assert!(validate_refresh_token(&refresh, SECRET).is_ok());

        let access = create_token(&claims(TokenType::Access), SECRET).unwrap();
        assert!(validate_refresh_token(&access, SECRET).is_err());
    }

    #[test]
    fn test_issue_token_pair() {
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();

        let pair = issue_token_pair(user_id, org_id, UserRole::Owner, SECRET).unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 86_400);

        let access = validate_access_token(&pair.access_token, SECRET).unwrap();
        let refresh = validate_refresh_token(&pair.refresh_token, SECRET).unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(refresh.org, org_id);
        assert_eq!(access.role, UserRole::Owner);
    }
}
