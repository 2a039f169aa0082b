use std::error::Error as StdError;

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};
use uuid::Uuid;

use super::{event, ticket_type, user, Client};

/// Proof of a confirmed reservation. Rows are only ever created by the
/// payment approval statement, never by a buyer action.
#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub user: user::Id,
    pub event: event::Id,
    pub ticket_type: ticket_type::Id,
    pub status: Status,
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    Valid = 1,
    Used = 2,
    Cancelled = 3,
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
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

impl Client {
    pub async fn get_tickets_by_user(
        &self,
        user: user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, user_id, event_id, ticket_type_id, status, created_at \
            FROM tickets \
            WHERE user_id = $1 \
            ORDER BY created_at DESC, id DESC";
        Ok(self
            .0
            .query(SQL, &[&user])
            .await?
            .into_iter()
            .map(decode_ticket)
            .collect())
    }

    /// Tickets issued across one organizer's events.
    pub async fn get_tickets_count_by_organizer(
        &self,
        organizer: user::Id,
    ) -> Result<usize, Error> {
        const SQL: &str = "\
            SELECT COUNT(*) \
            FROM tickets t \
            JOIN events e ON e.id = t.event_id \
            WHERE e.organizer_id = $1";
        Ok(self
            .0
            .query_one(SQL, &[&organizer])
            .await?
            .get::<_, i64>(0)
            .try_into()
            .unwrap())
    }
}

fn decode_ticket(row: tokio_postgres::Row) -> Ticket {
    Ticket {
        id: row.get("id"),
        user: row.get("user_id"),
        event: row.get("event_id"),
        ticket_type: row.get("ticket_type_id"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}
