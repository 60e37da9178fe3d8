//! What callers get to see of a user row.

use notekeep_model::{User, UserId};
use serde::Serialize;

/// A user row without its password hash. The role is shown by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub role: &'static str,
    pub is_verified: bool,
    pub is_active: bool,
    pub media_id: Option<i64>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            username: user.username,
            role: user.role.as_str(),
            is_verified: user.is_verified,
            is_active: user.is_active,
            media_id: user.media_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use notekeep_model::Role;

    use super::*;

    #[test]
    fn test_user_view_shows_role_by_name() {
        let user = User {
            id: UserId(3),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            email: "alice@example.com".into(),
            username: "alice".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Admin,
            is_verified: true,
            is_active: true,
            media_id: Some(9),
        };

        let view = UserView::from(user);

        assert_eq!(view.role, "admin");
        assert_eq!(view.media_id, Some(9));
        assert_eq!(view.id, UserId(3));
    }
}
