use std::{collections::HashMap, error::Error as StdError};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use constant_time_eq::constant_time_eq;
use derive_more::Display;
use enum_utils::TryFromRepr;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};
use uuid::Uuid;

use super::Client;

#[derive(Clone, Debug)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: PasswordHash,
    pub created_at: OffsetDateTime,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl FromSql<'_> for Id {
    accepts!(UUID);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Uuid::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(UUID);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular buyer. Every signup starts here.
    User = 1,

    /// Owns events and bank accounts, reviews payments for own events.
    Organizer = 2,

    /// Full access, including payment review for any event and role
    /// assignment.
    Admin = 3,
}

impl Role {
    /// Whether this role may manage events, bank accounts and payment
    /// reviews at all. Ownership checks come on top of this.
    pub fn is_staff(self) -> bool {
        match self {
            Self::Organizer | Self::Admin => true,
            Self::User => false,
        }
    }

    pub fn is_admin(self) -> bool {
        match self {
            Self::Admin => true,
            Self::User | Self::Organizer => false,
        }
    }
}

impl FromSql<'_> for Role {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let role = Self::try_from(repr).map_err(|_| "invalid role")?;
        Ok(role)
    }
}

impl ToSql for Role {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// Salted SHA-256 password digest, stored as `base64(salt)$base64(digest)`.
///
/// Verification recomputes the digest with the stored salt and compares in
/// constant time. A lookup of an unknown email and a wrong password are
/// reported identically by the caller, so this type never exposes which
/// part failed.
#[derive(Clone, Debug)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(secret: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(format!(
            "{}${}",
            BASE64.encode(salt),
            BASE64.encode(Self::digest(&salt, secret)),
        ))
    }

    pub fn verify(&self, secret: &str) -> bool {
        let Some((salt, digest)) = self.0.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(digest)) =
            (BASE64.decode(salt), BASE64.decode(digest))
        else {
            return false;
        };
        constant_time_eq(&digest, &Self::digest(&salt, secret))
    }

    fn digest(salt: &[u8], secret: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(secret.as_bytes());
        hasher.finalize().into()
    }
}

impl FromSql<'_> for PasswordHash {
    accepts!(TEXT);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for PasswordHash {
    accepts!(TEXT);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

impl Client {
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, name, email, password_hash, role, \
                                  created_at \
                           FROM users \
                           WHERE email = $1 \
                           LIMIT 1";
        Ok(self.0.query_opt(SQL, &[&email]).await?.map(decode_user))
    }

    pub async fn get_user_by_id(&self, id: Id) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, name, email, password_hash, role, \
                                  created_at \
                           FROM users \
                           WHERE id = $1 \
                           LIMIT 1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.map(decode_user))
    }

    pub async fn get_users_by_ids(
        &self,
        ids: &[Id],
    ) -> Result<HashMap<Id, User>, Error> {
        const SQL: &str = "SELECT id, name, email, password_hash, role, \
                                  created_at \
                           FROM users \
                           WHERE id IN (SELECT unnest($1::UUID[])) \
                           LIMIT $2";

        let limit = i64::try_from(ids.len()).unwrap();

        Ok(self
            .0
            .query(SQL, &[&ids, &limit])
            .await?
            .into_iter()
            .map(|row| {
                let user = decode_user(row);
                (user.id, user)
            })
            .collect())
    }

    /// Admin view of the whole user base, newest accounts first.
    pub async fn get_users_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<User>, Error> {
        let offset = i64::try_from(offset).unwrap();
        let limit = i64::try_from(limit).unwrap();

        const SQL: &str = "SELECT id, name, email, password_hash, role, \
                                  created_at \
                           FROM users \
                           ORDER BY created_at DESC, id DESC \
                           OFFSET $1 LIMIT $2";
        Ok(self
            .0
            .query(SQL, &[&offset, &limit])
            .await?
            .into_iter()
            .map(decode_user)
            .collect())
    }

    pub async fn get_users_count(&self) -> Result<usize, Error> {
        const SQL: &str = "SELECT COUNT(*) FROM users";
        Ok(self
            .0
            .query_one(SQL, &[])
            .await?
            .get::<_, i64>(0)
            .try_into()
            .unwrap())
    }

    pub async fn get_organizers(&self) -> Result<Vec<User>, Error> {
        const SQL: &str = "SELECT id, name, email, password_hash, role, \
                                  created_at \
                           FROM users \
                           WHERE role = $1 \
                           ORDER BY created_at DESC";
        Ok(self
            .0
            .query(SQL, &[&Role::Organizer])
            .await?
            .into_iter()
            .map(decode_user)
            .collect())
    }

    pub async fn write_user(&self, user: &User) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO users (id, name, email, password_hash, role, \
                               created_at) \
            VALUES ($1, $2, $3, $4, $5, $6)";

        self.0
            .execute(
                SQL,
                &[
                    &user.id,
                    &user.name,
                    &user.email,
                    &user.password_hash,
                    &user.role,
                    &user.created_at,
                ],
            )
            .await
            .map(drop)
    }

    /// Reassigns a user's role. Returns `false` when no such user exists.
    pub async fn set_user_role(
        &self,
        id: Id,
        role: Role,
    ) -> Result<bool, Error> {
        const SQL: &str = "UPDATE users SET role = $2 WHERE id = $1";
        Ok(self.0.execute(SQL, &[&id, &role]).await? == 1)
    }
}

fn decode_user(row: tokio_postgres::Row) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        created_at: row.get("created_at"),
    }
}
