use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;

use serde::Deserialize;

use super::domain::UserId;
use super::repository::{RepositoryError, UserAccount, UserDirectory, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryImportError {
    #[error("failed to read user directory export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid user directory CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: String,
    email: String,
    role: String,
    #[serde(default)]
    is_active: Option<String>,
    #[serde(default)]
    email_verified: Option<String>,
}

/// Identity directory held in memory, optionally seeded from a CSV export with the columns
/// `id,email,role,is_active,email_verified`.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserAccount>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserAccount>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.upsert(user);
        }
        directory
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DirectoryImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DirectoryImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut accounts = Vec::new();
        for (index, row) in csv_reader.deserialize::<UserRow>().enumerate() {
            let row = row?;
            // header is line 1
            accounts.push(account_from_row(index + 2, row)?);
        }

        Ok(Self::with_users(accounts))
    }

    pub fn upsert(&self, account: UserAccount) {
        if let Ok(mut users) = self.users.write() {
            users.insert(account.id.clone(), account);
        }
    }

    pub fn len(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn account_from_row(row_number: usize, row: UserRow) -> Result<UserAccount, DirectoryImportError> {
    let invalid = |message: String| DirectoryImportError::InvalidRow {
        row: row_number,
        message,
    };

    if row.id.is_empty() {
        return Err(invalid("id is empty".to_string()));
    }
    let email = row.email.to_lowercase();
    if !email.contains('@') {
        return Err(invalid(format!("'{}' is not an email address", row.email)));
    }
    let role = match row.role.to_ascii_lowercase().as_str() {
        "user" => UserRole::User,
        "admin" => UserRole::Admin,
        "super_admin" => UserRole::SuperAdmin,
        other => return Err(invalid(format!("unknown role '{other}'"))),
    };

    Ok(UserAccount {
        id: UserId(row.id),
        email,
        role,
        is_active: parse_flag(row.is_active.as_deref(), true),
        email_verified: parse_flag(row.email_verified.as_deref(), false),
    })
}

fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if value.is_empty() => default,
        Some(value) => matches!(value.as_str(), "1" | "true" | "yes" | "y"),
        None => default,
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn fetch(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| RepositoryError::Unavailable("user directory lock poisoned".into()))?;
        Ok(users.get(id).cloned())
    }

    fn administrators(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| RepositoryError::Unavailable("user directory lock poisoned".into()))?;
        let mut admins: Vec<UserAccount> = users
            .values()
            .filter(|user| user.role.is_admin())
            .cloned()
            .collect();
        admins.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(admins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const EXPORT: &str = "id,email,role,is_active,email_verified\n\
        u-1,Ada@Example.org,user,true,true\n\
        a-1,ops@example.org,admin,true,yes\n\
        a-2,root@example.org,super_admin,,\n";

    #[test]
    fn imports_rows_and_normalizes_email() {
        let directory =
            InMemoryUserDirectory::from_reader(Cursor::new(EXPORT)).expect("export parses");
        assert_eq!(directory.len(), 3);

        let ada = directory
            .fetch(&UserId("u-1".to_string()))
            .expect("fetch succeeds")
            .expect("user present");
        assert_eq!(ada.email, "ada@example.org");
        assert_eq!(ada.role, UserRole::User);
        assert!(ada.is_reachable());

        let root = directory
            .fetch(&UserId("a-2".to_string()))
            .expect("fetch succeeds")
            .expect("user present");
        assert!(root.is_active);
        assert!(!root.email_verified, "blank verification flag defaults to false");
    }

    #[test]
    fn administrators_include_super_admins() {
        let directory =
            InMemoryUserDirectory::from_reader(Cursor::new(EXPORT)).expect("export parses");
        let admins = directory.administrators().expect("admins listed");
        let ids: Vec<_> = admins.iter().map(|user| user.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);
    }

    #[test]
    fn rejects_unknown_roles_with_row_number() {
        let export = "id,email,role\nu-1,a@example.org,user\nu-2,b@example.org,owner\n";
        match InMemoryUserDirectory::from_reader(Cursor::new(export)) {
            Err(DirectoryImportError::InvalidRow { row, message }) => {
                assert_eq!(row, 3);
                assert!(message.contains("owner"));
            }
            other => panic!("expected invalid row error, got {other:?}"),
        }
    }
}
