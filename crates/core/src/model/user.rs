use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::UserId;
use crate::model::progress::UserAggregates;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("username cannot be empty")]
    EmptyUsername,
}

/// Access role carried by a verified credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse a stored role string.
    ///
    /// # Errors
    ///
    /// Returns `UserError::UnknownRole` for anything other than `user` or `admin`.
    pub fn parse(s: &str) -> Result<Self, UserError> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UserError::UnknownRole(other.to_owned())),
        }
    }
}

/// A platform user and the progress aggregates cached on their row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    email: String,
    role: Role,
    aggregates: UserAggregates,
}

impl User {
    /// Creates a user with zeroed aggregates.
    ///
    /// # Errors
    ///
    /// Returns `UserError::EmptyUsername` if the username is blank.
    pub fn new(
        id: UserId,
        username: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Result<Self, UserError> {
        Self::from_persisted(id, username, email, role, UserAggregates::default())
    }

    /// Rehydrate a user from storage.
    ///
    /// # Errors
    ///
    /// Returns `UserError::EmptyUsername` if the username is blank.
    pub fn from_persisted(
        id: UserId,
        username: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        aggregates: UserAggregates,
    ) -> Result<Self, UserError> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(UserError::EmptyUsername);
        }
        Ok(Self {
            id,
            username,
            email: email.into(),
            role,
            aggregates,
        })
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn aggregates(&self) -> UserAggregates {
        self.aggregates
    }

    /// Returns the same user carrying freshly derived aggregates.
    #[must_use]
    pub fn with_aggregates(mut self, aggregates: UserAggregates) -> Self {
        self.aggregates = aggregates;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!(Role::parse(Role::Admin.as_str()).unwrap(), Role::Admin);
        assert!(Role::parse("owner").is_err());
    }

    #[test]
    fn new_user_starts_without_progress() {
        let user = User::new(UserId::new(5), "rina", "rina@example.com", Role::User).unwrap();
        assert_eq!(user.aggregates(), UserAggregates::default());
    }

    #[test]
    fn blank_username_is_rejected() {
        let err = User::new(UserId::new(1), "  ", "x@example.com", Role::User).unwrap_err();
        assert_eq!(err, UserError::EmptyUsername);
    }
}
