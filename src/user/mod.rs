mod service;

pub use service::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access level of an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "Administrador", alias = "Administrator")]
    Administrator,
    #[default]
    #[serde(alias = "Standard")]
    Standard,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrator => write!(f, "administrator"),
            Role::Standard => write!(f, "standard"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" => Ok(Role::Administrator),
            "standard" => Ok(Role::Standard),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip)]
    pub password: String,
    pub confirmed: bool,
    /// Pending confirmation or password reset token.
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(skip)]
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Attach a single-use token valid until `expires_at`.
    pub fn with_token(mut self, token: String, expires_at: DateTime<Utc>) -> Self {
        self.token = Some(token);
        self.token_expires_at = Some(expires_at);
        self
    }

    /// Forget the pending token once it has been used.
    pub fn clear_token(&mut self) {
        self.token = None;
        self.token_expires_at = None;
    }

    /// Whether the pending token can still be redeemed at `now`.
    pub fn token_is_live(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some()
            && self.token_expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// Authenticated caller, stripped of credentials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

/// User as shown to other users, e.g. on a passenger list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}
