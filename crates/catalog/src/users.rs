use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use redb::ReadableTable;

use common::{new_id, User};

use crate::store::{
    decode_value, encode_value, Catalog, CatalogError, UserRow, USERS_BY_NAME_TABLE, USERS_TABLE,
};

impl Catalog {
    /// Registers a user with an argon2id password digest. Usernames are
    /// unique case-insensitively.
    pub fn create_user(
        &self,
        display_name: &str,
        username: &str,
        password: &str,
    ) -> Result<User, CatalogError> {
        let username = username.trim().to_string();
        let name_key = username.to_lowercase();

        let salt = SaltString::generate(&mut OsRng);
        let digest = Argon2::default()
            .hash_password(password.as_bytes(), &salt)?
            .to_string();

        let write_txn = self.db.begin_write()?;
        let row;
        {
            let mut users = write_txn.open_table(USERS_TABLE)?;
            let mut by_name = write_txn.open_table(USERS_BY_NAME_TABLE)?;
            if by_name.get(name_key.as_str())?.is_some() {
                return Err(CatalogError::Conflict);
            }
            row = UserRow {
                id: new_id(),
                display_name: display_name.trim().to_string(),
                username,
                password_digest: digest,
                state: Default::default(),
            };
            users.insert(row.id.as_str(), encode_value(&row)?.as_slice())?;
            by_name.insert(name_key.as_str(), row.id.as_bytes())?;
        }
        write_txn.commit()?;
        Ok(public_user(&row))
    }

    /// Checks a username/password pair. An unknown username and a wrong
    /// password are deliberately indistinguishable to the caller.
    pub fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, CatalogError> {
        let row = match self.user_row_by_name(username)? {
            Some(row) => row,
            None => return Err(CatalogError::NotFound),
        };
        let parsed = PasswordHash::new(&row.password_digest)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(public_user(&row)),
            Err(argon2::password_hash::Error::Password) => Err(CatalogError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    pub fn get_user(&self, user_id: &str) -> Result<User, CatalogError> {
        Ok(public_user(&self.user_row(user_id)?))
    }

    pub(crate) fn user_row(&self, user_id: &str) -> Result<UserRow, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS_TABLE)?;
        let row = match users.get(user_id)? {
            Some(guard) => decode_value(guard.value())?,
            None => return Err(CatalogError::NotFound),
        };
        Ok(row)
    }

    fn user_row_by_name(&self, username: &str) -> Result<Option<UserRow>, CatalogError> {
        let name_key = username.trim().to_lowercase();
        let read_txn = self.db.begin_read()?;
        let by_name = read_txn.open_table(USERS_BY_NAME_TABLE)?;
        let user_id = match by_name.get(name_key.as_str())? {
            Some(guard) => String::from_utf8_lossy(guard.value()).to_string(),
            None => return Ok(None),
        };
        let users = read_txn.open_table(USERS_TABLE)?;
        let row = match users.get(user_id.as_str())? {
            Some(guard) => Some(decode_value(guard.value())?),
            None => None,
        };
        Ok(row)
    }
}

fn public_user(row: &UserRow) -> User {
    User {
        id: row.id.clone(),
        display_name: row.display_name.clone(),
        username: row.username.clone(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::store::{Catalog, CatalogError};

    fn catalog(dir: &TempDir) -> Catalog {
        Catalog::open(&dir.path().join("catalog.redb")).unwrap()
    }

    #[test]
    fn register_then_verify() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        let created = catalog.create_user("Ada", "ada", "hunter2").unwrap();

        let verified = catalog.verify_credentials("ada", "hunter2").unwrap();
        assert_eq!(verified.id, created.id);
        assert_eq!(verified.display_name, "Ada");
    }

    #[test]
    fn wrong_password_is_rejected() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        catalog.create_user("Ada", "ada", "hunter2").unwrap();

        assert!(matches!(
            catalog.verify_credentials("ada", "wrong"),
            Err(CatalogError::NotFound)
        ));
        assert!(matches!(
            catalog.verify_credentials("nobody", "hunter2"),
            Err(CatalogError::NotFound)
        ));
    }

    #[test]
    fn usernames_are_unique_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        catalog.create_user("Ada", "ada", "hunter2").unwrap();

        assert!(matches!(
            catalog.create_user("Other", "Ada", "secret"),
            Err(CatalogError::Conflict)
        ));
    }

    #[test]
    fn digest_is_never_exposed() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        let created = catalog.create_user("Ada", "ada", "hunter2").unwrap();
        let loaded = catalog.get_user(&created.id).unwrap();
        assert_eq!(loaded.username, "ada");
    }
}
