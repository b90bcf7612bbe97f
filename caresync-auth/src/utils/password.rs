use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for a cleartext password, so it cannot end up in logs by
/// accident.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Hash a password with Argon2id. The salt is generated here and encoded
/// into the PHC string.
pub fn hash_password(password: &Password) -> Result<String, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored PHC hash.
pub fn verify_password(password: &Password, password_hash: &str) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let password = Password::new("correct horse battery staple".to_string());
        let hash = hash_password(&password).expect("hashing failed");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&password, &hash).is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let password = Password::new("original".to_string());
        let hash = hash_password(&password).expect("hashing failed");

        let wrong = Password::new("not-the-original".to_string());
        assert!(verify_password(&wrong, &hash).is_err());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let password = Password::new("repeat".to_string());
        let a = hash_password(&password).expect("hashing failed");
        let b = hash_password(&password).expect("hashing failed");
        assert_ne!(a, b);
    }

    #[test]
    fn debug_never_prints_cleartext() {
        let password = Password::new("top-secret".to_string());
        assert!(!format!("{:?}", password).contains("top-secret"));
    }
}
