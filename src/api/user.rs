use serde::{Deserialize, Serialize};

pub use crate::db::user::{Id, Role};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&crate::db::User> for User {
    fn from(user: &crate::db::User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Public face of a user. Embedded wherever an unauthenticated caller can
/// see the row, so it carries no email.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Summary {
    pub id: Id,
    pub name: String,
}

impl From<&crate::db::User> for Summary {
    fn from(user: &crate::db::User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub users: Vec<User>,
    pub total_count: usize,
}
