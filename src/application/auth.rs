//! Accounts, password verification and server-side sessions.
//!
//! A session token has the shape `fo_<prefix>_<secret>`. The prefix is stored
//! in clear for lookup; only the SHA-256 of the secret is persisted and it is
//! compared in constant time.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::forms::SignupFormData;
use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::{UserRecord, UserSummary};

const TOKEN_PREFIX: &str = "fo";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// The user behind the current request, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer(Option<UserSummary>);

impl Viewer {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn authenticated(user: UserSummary) -> Self {
        Self(Some(user))
    }

    pub fn user(&self) -> Option<&UserSummary> {
        self.0.as_ref()
    }

    pub fn into_user(self) -> Option<UserSummary> {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user: UserSummary,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn register(&self, form: SignupFormData) -> Result<UserRecord, AuthError> {
        let password_hash = hash_password(&form.password)?;
        let username = form.username.clone();
        let user = self
            .users
            .create_user(CreateUserParams {
                username: form.username,
                first_name: form.first_name,
                last_name: form.last_name,
                email: form.email,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AuthError::UsernameTaken(username),
                other => AuthError::Repo(other),
            })?;

        info!(
            target = "folio::application::auth",
            user_id = user.id,
            username = %user.username,
            "user registered"
        );
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let user = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let prefix = generate_prefix();
        let secret = generate_secret();
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;
        self.sessions
            .create_session(CreateSessionParams {
                user_id: user.id,
                prefix: prefix.clone(),
                hashed_secret: hash_secret(&secret),
                expires_at,
            })
            .await?;

        info!(
            target = "folio::application::auth",
            user_id = user.id,
            username = %user.username,
            "session opened"
        );
        Ok(IssuedSession {
            token: format!("{TOKEN_PREFIX}_{prefix}_{secret}"),
            user: user.summary(),
            expires_at,
        })
    }

    /// Resolve a session cookie to its user. Unknown, tampered and expired
    /// tokens all resolve to `None`; expired rows are removed on the way.
    pub async fn resolve(&self, token: &str) -> Result<Option<UserSummary>, AuthError> {
        let Some(parsed) = parse_token(token) else {
            return Ok(None);
        };
        let Some(session) = self.sessions.find_session_by_prefix(&parsed.prefix).await? else {
            return Ok(None);
        };

        if session.expires_at <= OffsetDateTime::now_utc() {
            debug!(
                target = "folio::application::auth",
                session_id = session.id,
                "dropping expired session"
            );
            self.sessions.delete_session(session.id).await?;
            return Ok(None);
        }

        let hashed_input = hash_secret(&parsed.secret);
        if session.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Ok(None);
        }

        let user = self.users.find_user_by_id(session.user_id).await?;
        Ok(user.map(|user| user.summary()))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let Some(parsed) = parse_token(token) else {
            return Ok(());
        };
        if let Some(session) = self.sessions.find_session_by_prefix(&parsed.prefix).await?
            && session.hashed_secret.ct_eq(&hash_secret(&parsed.secret)).unwrap_u8() == 1
        {
            self.sessions.delete_session(session.id).await?;
            info!(
                target = "folio::application::auth",
                user_id = session.user_id,
                "session closed"
            );
        }
        Ok(())
    }

    pub async fn prune_expired(&self) -> Result<u64, AuthError> {
        Ok(self
            .sessions
            .delete_expired_sessions(OffsetDateTime::now_utc())
            .await?)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if prefix.is_empty() || secret.len() < MIN_SECRET_LEN {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}
