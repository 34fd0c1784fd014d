use serde::{Deserialize, Serialize};

use ewallet_core::{AccountId, DomainError, DomainResult, Entity, Money};

const MAX_USERNAME_LEN: usize = 64;

/// A wallet account as stored.
///
/// The password hash is produced and verified by the authentication
/// collaborator; this crate only carries it through and never logs it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub balance: Money,
}

impl core::fmt::Debug for Account {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("balance", &self.balance)
            .finish()
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> AccountId {
        self.id
    }
}

/// Registration input. Accounts always open with a zero balance.
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    username: String,
    password_hash: String,
}

impl NewAccount {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> DomainResult<Self> {
        let username = username.into().trim().to_string();
        let password_hash = password_hash.into();

        if username.is_empty() {
            return Err(DomainError::validation("username must not be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(DomainError::validation(format!(
                "username must be at most {MAX_USERNAME_LEN} characters"
            )));
        }
        if password_hash.is_empty() {
            return Err(DomainError::validation("password hash must not be empty"));
        }

        Ok(Self {
            username,
            password_hash,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Materialise the stored row once the store has assigned an id.
    pub fn into_account(self, id: AccountId) -> Account {
        Account {
            id,
            username: self.username,
            password_hash: self.password_hash,
            balance: Money::ZERO,
        }
    }
}

impl core::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_trimmed_and_required() {
        let acc = NewAccount::new("  alice ", "hash").unwrap();
        assert_eq!(acc.username(), "alice");

        let err = NewAccount::new("   ", "hash").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn overlong_username_is_rejected() {
        let name = "x".repeat(MAX_USERNAME_LEN + 1);
        assert!(NewAccount::new(name, "hash").is_err());
    }

    #[test]
    fn new_account_opens_at_zero_and_hides_hash() {
        let acc = NewAccount::new("bob", "s3cr3t-hash")
            .unwrap()
            .into_account(AccountId::new(7));
        assert_eq!(acc.balance, Money::ZERO);
        assert_eq!(acc.id(), AccountId::new(7));
        assert!(!format!("{acc:?}").contains("s3cr3t"));
    }
}
