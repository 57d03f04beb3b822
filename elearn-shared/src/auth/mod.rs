/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and policy
/// - [`jwt`]: HS256 access/refresh tokens carrying the user's role
/// - [`context`]: the authenticated caller attached to each request
/// - [`authorization`]: role, course ownership and paid-enrollment checks
///
/// # Example
///
/// ```no_run
/// use elearn_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use elearn_shared::auth::password::{hash_password, verify_password};
/// use elearn_shared::models::user::Role;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Etudiant2026")?;
/// assert!(verify_password("Etudiant2026", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), Role::Student, TokenType::Access);
/// let token = create_token(&claims, "secret-key")?;
/// validate_access_token(&token, "secret-key")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod context;
pub mod jwt;
pub mod password;
