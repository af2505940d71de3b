//! Registration, login and session handling
//!
//! Users and sessions live in the protected store, never reachable through
//! the open data endpoints. Passwords are stored as keyed SHA-256 digests;
//! the key is a fixed string because this is a practice server, not a
//! production credential store. Access tokens are digests of the session id
//! and are matched against the `X-Authorization` header on every request.

use crate::core::error::ServiceError;
use crate::core::record::{Record, ID};
use crate::storage::Storage;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const TOKEN_HEADER: &str = "X-Authorization";
pub const ADMIN_HEADER: &str = "X-Admin";

const HASH_KEY: &str = "This is not a production server";

const USERS: &str = "users";
const SESSIONS: &str = "sessions";
const PASSWORD: &str = "password";
const HASHED_PASSWORD: &str = "hashedPassword";
const ACCESS_TOKEN: &str = "accessToken";
const USER_ID: &str = "userId";

/// Keyed digest used for both stored passwords and access tokens
pub fn hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(HASH_KEY.as_bytes());
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Account and session operations over the protected store
#[derive(Clone)]
pub struct AuthService {
    protected: Storage,
    identity: String,
}

impl AuthService {
    pub fn new(protected: Storage, identity: impl Into<String>) -> Self {
        Self {
            protected,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Create an account and an initial session
    ///
    /// The response is the stored user profile with `accessToken` attached
    /// and the password hash removed.
    pub fn register(&self, body: &Record) -> Result<Value, ServiceError> {
        let identity_value = string_field(body, &self.identity);
        let password = string_field(body, PASSWORD);
        if identity_value.is_empty() || password.is_empty() {
            return Err(ServiceError::Request("Missing fields".to_string()));
        }

        let mut probe = Record::new();
        probe.insert(self.identity.clone(), Value::String(identity_value.clone()));
        if !self.query_protected(USERS, &probe)?.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "A user with the same {} already exists",
                self.identity
            )));
        }

        let mut user = body.clone();
        user.remove(PASSWORD);
        user.insert(HASHED_PASSWORD.to_string(), Value::String(hash(&password)));
        let stored = self.protected.add(USERS, &user)?;

        let token = self.create_session(&stored)?;
        Ok(profile(stored, token))
    }

    /// Verify credentials and open a new session
    pub fn login(&self, body: &Record) -> Result<Value, ServiceError> {
        let identity_value = string_field(body, &self.identity);
        let password = string_field(body, PASSWORD);

        let mut probe = Record::new();
        probe.insert(self.identity.clone(), Value::String(identity_value));
        let matched = self.query_protected(USERS, &probe)?;

        let user = matched
            .into_iter()
            .find(|user| {
                user.get(HASHED_PASSWORD).and_then(Value::as_str) == Some(&hash(&password))
            })
            .ok_or_else(|| {
                ServiceError::Credential("Login or password don't match".to_string())
            })?;

        let token = self.create_session(&user)?;
        Ok(profile(user, token))
    }

    /// Close the session behind a token
    pub fn logout(&self, token: &str) -> Result<(), ServiceError> {
        let session = self
            .find_session(token)?
            .ok_or_else(|| ServiceError::Credential("User session does not exist".to_string()))?;
        let session_id = session
            .get(ID)
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::Internal("session without id".to_string()))?;
        self.protected.delete(SESSIONS, session_id)?;
        Ok(())
    }

    /// Resolve an `X-Authorization` token to its user profile
    pub fn resolve_token(&self, token: &str) -> Result<Value, ServiceError> {
        let invalid = || ServiceError::Credential("Invalid access token".to_string());
        let session = self.find_session(token)?.ok_or_else(invalid)?;
        let user_id = session
            .get(USER_ID)
            .and_then(Value::as_str)
            .ok_or_else(invalid)?;
        self.protected.get(USERS, user_id).map_err(|_| invalid())
    }

    fn find_session(&self, token: &str) -> Result<Option<Value>, ServiceError> {
        let mut probe = Record::new();
        probe.insert(ACCESS_TOKEN.to_string(), Value::String(token.to_string()));
        Ok(self.query_protected(SESSIONS, &probe)?.into_iter().next())
    }

    fn create_session(&self, user: &Value) -> Result<String, ServiceError> {
        let user_id = user
            .get(ID)
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::Internal("user without id".to_string()))?;

        let mut session = Record::new();
        session.insert(USER_ID.to_string(), Value::String(user_id.to_string()));
        let stored = self.protected.add(SESSIONS, &session)?;
        let session_id = stored
            .get(ID)
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::Internal("session without id".to_string()))?;

        let token = hash(session_id);
        session.insert(ACCESS_TOKEN.to_string(), Value::String(token.clone()));
        self.protected.set(SESSIONS, session_id, &session)?;
        Ok(token)
    }

    // The protected store may start without users/sessions; treat a missing
    // collection as an empty result rather than a 404.
    fn query_protected(
        &self,
        collection: &str,
        probe: &Record,
    ) -> Result<Vec<Value>, ServiceError> {
        match self.protected.query(collection, probe) {
            Ok(found) => Ok(found),
            Err(ServiceError::NotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

fn string_field(body: &Record, field: &str) -> String {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// User profile as returned by register/login: token in, password hash out
fn profile(mut user: Value, token: String) -> Value {
    if let Some(object) = user.as_object_mut() {
        object.remove(HASHED_PASSWORD);
        object.insert(ACCESS_TOKEN.to_string(), Value::String(token));
    }
    user
}

/// Strip credential material from an outgoing user record
pub fn sanitize(mut user: Value) -> Value {
    if let Some(object) = user.as_object_mut() {
        object.remove(HASHED_PASSWORD);
    }
    user
}
