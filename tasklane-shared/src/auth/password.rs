/// Argon2id password hashing and strength rules
///
/// Hashes are stored as PHC strings, so the parameters travel with each
/// hash and can be raised later without invalidating existing accounts.
///
/// # Parameters
///
/// - Memory: 64 MiB
/// - Iterations: 3
/// - Parallelism: 4 lanes
/// - Output: 32 bytes
///
/// # Example
///
/// ```
/// use tasklane_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Correct1Horse")?;
/// assert!(verify_password("Correct1Horse", &hash)?);
/// assert!(!verify_password("correct1horse", &hash)?);
/// # Ok(())
/// # }
/// ```
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),

    /// Password does not meet the strength rules
    #[error("{0}")]
    Weak(&'static str),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = ParamsBuilder::new()
        .m_cost(65536)
        .t_cost(3)
        .p_cost(4)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password with a fresh random salt.
///
/// ```text
/// $argon2id$v=19$m=65536,t=3,p=4$<salt>$<hash>
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Constant-time check of `password` against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch and an error only for unreadable hashes.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Requires at least [`MIN_PASSWORD_LENGTH`] characters with an uppercase
/// letter, a lowercase letter and a digit.
///
/// ```
/// use tasklane_shared::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("Kanban2025").is_ok());
/// assert!(validate_password_strength("kanban2025").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::Weak(
            "Password must be at least 8 characters long",
        ));
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(PasswordError::Weak(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(PasswordError::Weak(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordError::Weak("Password must contain at least one digit"));
    }

    Ok(())
}
