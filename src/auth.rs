use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{
    error::AppError,
    models::actor::{Actor, ActorRole},
    services::session_store::SessionStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedActor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: ActorRole,
}

impl From<&Actor> for AuthenticatedActor {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id.clone(),
            name: actor.name.clone(),
            email: actor.email.clone(),
            role: actor.role,
        }
    }
}

pub fn hash_credential(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Credential(err.to_string()))
}

/// A malformed stored hash never verifies.
pub fn verify_credential(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Checks `email`/`password` against the actor persisted on this device, without
/// talking to the backend.
pub async fn authenticate_offline(
    store: &SessionStore,
    email: &str,
    password: &str,
) -> Result<AuthenticatedActor, AppError> {
    let actor = store.get_actor().await?.ok_or(AppError::NoActor)?;
    if actor.matches_email(email) && verify_credential(password, &actor.credential) {
        Ok(AuthenticatedActor::from(&actor))
    } else {
        Err(AppError::Credential("email or password does not match".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_credential("s3cret").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_credential("s3cret", &hash));
        assert!(!verify_credential("wrong", &hash));
    }

    #[test]
    fn plain_text_is_not_a_valid_hash() {
        assert!(!verify_credential("s3cret", "s3cret"));
    }
}
