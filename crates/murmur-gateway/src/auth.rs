use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation, decode};

use murmur_types::api::Claims;

use crate::error::GatewayError;
use crate::store::AccountDirectory;

/// Verifies the credential presented at handshake time.
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the username the token was issued to.
    fn verify(&self, token: &str) -> Result<String, GatewayError>;
}

/// HS256 JWT verification backed by the account directory, so tokens of
/// accounts that no longer exist are refused.
pub struct JwtAuthenticator {
    key: DecodingKey,
    directory: Arc<dyn AccountDirectory>,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            directory,
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn verify(&self, token: &str) -> Result<String, GatewayError> {
        let token_data = decode::<Claims>(token, &self.key, &Validation::default())
            .map_err(|e| GatewayError::Authentication(e.to_string()))?;

        let username = token_data.claims.username;
        let exists = self
            .directory
            .user_exists(&username)
            .map_err(GatewayError::store)?;
        if !exists {
            return Err(GatewayError::Authentication(format!("unknown user {username}")));
        }

        Ok(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use murmur_db::Database;
    use uuid::Uuid;

    fn token(secret: &str, username: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: username.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn authenticator() -> JwtAuthenticator {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user(&Uuid::new_v4().to_string(), "alice", "hash").unwrap();
        JwtAuthenticator::new("secret", db)
    }

    #[test]
    fn accepts_valid_token_for_known_user() {
        let auth = authenticator();
        assert_eq!(auth.verify(&token("secret", "alice", 3600)).unwrap(), "alice");
    }

    #[test]
    fn rejects_bad_signature_expiry_and_unknown_user() {
        let auth = authenticator();
        for bad in [
            token("other-secret", "alice", 3600),
            token("secret", "alice", -3600),
            token("secret", "mallory", 3600),
            "not-a-jwt".to_string(),
        ] {
            assert!(matches!(auth.verify(&bad), Err(GatewayError::Authentication(_))));
        }
    }
}
