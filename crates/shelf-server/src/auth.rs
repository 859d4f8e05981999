use std::collections::HashMap;

use async_trait::async_trait;
use shelf_types::{Role, UserId};

use crate::config::TokenEntry;
use crate::error::{ServerError, ServerResult};

/// The authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Read an `Authorization` header value. The `Bearer ` prefix is
    /// optional.
    pub fn from_header(value: Option<&str>) -> Self {
        let token = value
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
            .unwrap_or_default();
        if token.is_empty() {
            Self::Anonymous
        } else {
            Self::Bearer(token.to_string())
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Static bearer tokens from the server config.
#[derive(Debug, Default)]
pub struct TokenTableAuth {
    tokens: HashMap<String, Identity>,
}

impl TokenTableAuth {
    pub fn new<I: IntoIterator<Item = (String, Identity)>>(tokens: I) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    pub fn from_entries(entries: &[TokenEntry]) -> Self {
        Self::new(entries.iter().map(|e| {
            (
                e.token.clone(),
                Identity {
                    user_id: e.user_id,
                    role: e.role,
                },
            )
        }))
    }
}

#[async_trait]
impl AuthProvider for TokenTableAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Anonymous => {
                Err(ServerError::AuthFailed("missing authorization token".into()))
            }
            Credentials::Bearer(token) => self
                .tokens
                .get(token)
                .copied()
                .ok_or_else(|| ServerError::AuthFailed("invalid token".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parsing() {
        assert_eq!(Credentials::from_header(None), Credentials::Anonymous);
        assert_eq!(Credentials::from_header(Some("Bearer ")), Credentials::Anonymous);
        assert_eq!(
            Credentials::from_header(Some("Bearer abc")),
            Credentials::Bearer("abc".into())
        );
        assert_eq!(
            Credentials::from_header(Some("abc")),
            Credentials::Bearer("abc".into())
        );
    }

    #[tokio::test]
    async fn token_table() {
        let auth = TokenTableAuth::from_entries(&[
            TokenEntry {
                token: "root".into(),
                user_id: UserId::new(1),
                role: Role::Admin,
            },
            TokenEntry {
                token: "reader".into(),
                user_id: UserId::new(2),
                role: Role::User,
            },
        ]);

        let admin = auth.authenticate(&Credentials::Bearer("root".into())).await.unwrap();
        assert_eq!(admin, Identity::admin(UserId::new(1)));
        assert!(admin.is_admin());

        let reader = auth.authenticate(&Credentials::Bearer("reader".into())).await.unwrap();
        assert_eq!(reader, Identity::user(UserId::new(2)));
    }

    #[tokio::test]
    async fn rejects_unknown_and_missing_tokens() {
        let auth = TokenTableAuth::default();
        let err = auth.authenticate(&Credentials::Anonymous).await.unwrap_err();
        assert_eq!(err.to_string(), "missing authorization token");
        let err = auth.authenticate(&Credentials::Bearer("nope".into())).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid token");
    }
}
