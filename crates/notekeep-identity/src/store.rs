//! The persisted user store contract and an in-memory implementation.

use std::collections::BTreeMap;
use std::future::Future;

use notekeep_model::{Role, User, UserId};
use tokio::sync::Mutex;

use crate::StoreError;

/// Fields for a row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Editable profile fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
}

/// Relational storage for user rows.
///
/// Rows are never deleted through normal operation: deactivation flips
/// `is_active`. The one exception is [`discard`](Self::discard), which
/// undoes a `create` whose registration could not be completed.
pub trait UserStore: Send + Sync + 'static {
    /// Inserts a new, unverified, active row and returns it with its id.
    ///
    /// # Errors
    /// [`StoreError::Duplicate`] naming the conflicting field.
    fn create(&self, user: NewUser) -> impl Future<Output = Result<User, StoreError>> + Send;

    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn find_by_id(&self, id: UserId) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Sets `is_verified` on the row with this username.
    fn mark_verified(&self, username: &str) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Sets `is_active` on the row with this id.
    fn set_active(
        &self,
        id: UserId,
        active: bool,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Rewrites the profile fields of an active row.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for an unknown or inactive id,
    /// [`StoreError::Duplicate`] if the new username or email is taken.
    fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// All rows, ordered by id.
    fn list(&self) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;

    /// Removes a row created moments ago by a registration that failed
    /// half-way.
    fn discard(&self, id: UserId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryUserStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    users: BTreeMap<UserId, User>,
}

impl Rows {
    fn conflict(&self, except: Option<UserId>, username: &str, email: &str) -> Option<&'static str> {
        let others = self.users.values().filter(|u| Some(u.id) != except);
        for user in others {
            if user.username == username {
                return Some("username");
            }
            if user.email.eq_ignore_ascii_case(email) {
                return Some("email");
            }
        }
        None
    }

    fn get_mut(&mut self, id: UserId) -> Result<&mut User, StoreError> {
        self.users.get_mut(&id).ok_or(StoreError::NotFound)
    }
}

/// Keeps users in process memory. Ids start at 1.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    rows: Mutex<Rows>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(field) = rows.conflict(None, &user.username, &user.email) {
            return Err(StoreError::Duplicate {
                field: field.to_string(),
            });
        }

        rows.next_id += 1;
        let row = User {
            id: UserId(rows.next_id),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            is_verified: false,
            is_active: true,
            media_id: None,
        };
        rows.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.rows.lock().await.users.get(&id).cloned())
    }

    async fn mark_verified(&self, username: &str) -> Result<User, StoreError> {
        let mut rows = self.rows.lock().await;
        let user = rows
            .users
            .values_mut()
            .find(|u| u.username == username)
            .ok_or(StoreError::NotFound)?;
        user.is_verified = true;
        Ok(user.clone())
    }

    async fn set_active(&self, id: UserId, active: bool) -> Result<User, StoreError> {
        let mut rows = self.rows.lock().await;
        let user = rows.get_mut(id)?;
        user.is_active = active;
        Ok(user.clone())
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User, StoreError> {
        let mut rows = self.rows.lock().await;
        if !rows.users.get(&id).is_some_and(|u| u.is_active) {
            return Err(StoreError::NotFound);
        }
        if let Some(field) = rows.conflict(Some(id), &update.username, &update.email) {
            return Err(StoreError::Duplicate {
                field: field.to_string(),
            });
        }

        let user = rows.get_mut(id)?;
        user.first_name = update.first_name;
        user.last_name = update.last_name;
        user.email = update.email;
        user.username = update.username;
        Ok(user.clone())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.rows.lock().await.users.values().cloned().collect())
    }

    async fn discard(&self, id: UserId) -> Result<(), StoreError> {
        self.rows
            .lock()
            .await
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
