use crate::errors::AuthError;
use crate::storage::{FieldMap, StatBackend};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const USERS_COLLECTION: &str = "users";
const MIN_PASSWORD_LEN: usize = 6;

/// Identity collaborator: account records keyed by lowercased email, with
/// bcrypt password hashes, stored through the same backend as everything
/// else. Validation happens before any storage call.
pub struct LocalIdentity<B: StatBackend> {
    backend: Arc<B>,
}

impl<B: StatBackend> LocalIdentity<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Uuid, AuthError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AuthError::Validation("name cannot be empty".into()));
        }
        if !email_looks_valid(&email) {
            return Err(AuthError::Validation("enter a valid email address".into()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        if self.lookup(&email).await?.is_some() {
            return Err(AuthError::EmailInUse);
        }

        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let user_id = Uuid::new_v4();

        let mut fields = FieldMap::new();
        fields.insert("userId".into(), user_id.to_string().into());
        fields.insert("name".into(), name.into());
        fields.insert("email".into(), email.clone().into());
        fields.insert("passwordHash".into(), hash.into());
        fields.insert("createdAt".into(), Utc::now().to_rfc3339().into());

        self.backend
            .write(USERS_COLLECTION, &email, fields, false)
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        info!(%email, "account created");
        Ok(user_id)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Uuid, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("enter email and password".into()));
        }

        let stored = self.lookup(&email).await?.ok_or(AuthError::InvalidCredentials)?;
        let hash = stored
            .get("passwordHash")
            .and_then(Value::as_str)
            .ok_or(AuthError::InvalidCredentials)?;
        if !bcrypt::verify(password, hash).unwrap_or(false) {
            return Err(AuthError::InvalidCredentials);
        }

        stored
            .get("userId")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| AuthError::Transport("corrupt account record".into()))
    }

    async fn lookup(&self, email: &str) -> Result<Option<FieldMap>, AuthError> {
        self.backend
            .read(USERS_COLLECTION, email)
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

// local@domain.tld shape, the same bar the original sign-up form set.
fn email_looks_valid(email: &str) -> bool {
    if email.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}
