/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and password strength rules
/// - [`jwt`]: Access/refresh token issuance and validation
/// - [`middleware`]: Bearer token parsing and the request `AuthContext`
/// - [`authorization`]: Role checks over the `AuthContext`
///
/// # Example
///
/// ```no_run
/// use tasklane_shared::auth::password::{hash_password, verify_password};
/// use tasklane_shared::auth::jwt::issue_token_pair;
/// use tasklane_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Kanban2025")?;
/// assert!(verify_password("Kanban2025", &hash)?);
///
/// let tokens = issue_token_pair(Uuid::new_v4(), Uuid::new_v4(), UserRole::Owner, "secret")?;
/// # Ok(())
/// # }
/// ```
pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
