use std::{collections::HashMap, error::Error as StdError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};
use uuid::Uuid;

use super::{event, Client};

/// A priced admission tier under one event.
///
/// `quantity_sold` is bumped exclusively by ticket issuance, inside the
/// payment approval statement.
#[derive(Clone, Debug)]
pub struct TicketType {
    pub id: Id,
    pub event: event::Id,
    pub name: String,
    /// Minor currency units (cents).
    pub price: i64,
    pub quantity_total: usize,
    pub quantity_sold: usize,
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

// Reservations arrive as multipart form data, so this id is parsed from a
// text field rather than deserialized.
impl std::str::FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
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

impl Client {
    pub async fn get_ticket_type_by_id(
        &self,
        id: Id,
    ) -> Result<Option<TicketType>, Error> {
        const SQL: &str = "\
            SELECT id, event_id, name, price, quantity_total, quantity_sold \
            FROM ticket_types \
            WHERE id = $1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.map(decode_ticket_type))
    }

    pub async fn get_ticket_types_by_event(
        &self,
        event: event::Id,
    ) -> Result<Vec<TicketType>, Error> {
        const SQL: &str = "\
            SELECT id, event_id, name, price, quantity_total, quantity_sold \
            FROM ticket_types \
            WHERE event_id = $1 \
            ORDER BY price ASC, id ASC";
        Ok(self
            .0
            .query(SQL, &[&event])
            .await?
            .into_iter()
            .map(decode_ticket_type)
            .collect())
    }

    pub async fn get_ticket_types_by_ids(
        &self,
        ids: &[Id],
    ) -> Result<HashMap<Id, TicketType>, Error> {
        const SQL: &str = "\
            SELECT id, event_id, name, price, quantity_total, quantity_sold \
            FROM ticket_types \
            WHERE id IN (SELECT unnest($1::UUID[])) \
            LIMIT $2";

        let limit = i64::try_from(ids.len()).unwrap();

        Ok(self
            .0
            .query(SQL, &[&ids, &limit])
            .await?
            .into_iter()
            .map(|row| {
                let tt = decode_ticket_type(row);
                (tt.id, tt)
            })
            .collect())
    }

    pub async fn write_ticket_type(
        &self,
        ticket_type: &TicketType,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO ticket_types (id, event_id, name, price, \
                                      quantity_total, quantity_sold) \
            VALUES ($1, $2, $3, $4, $5, $6) \
            ON CONFLICT (id) DO UPDATE \
            SET name = EXCLUDED.name, \
                price = EXCLUDED.price, \
                quantity_total = EXCLUDED.quantity_total";

        self.0
            .execute(
                SQL,
                &[
                    &ticket_type.id,
                    &ticket_type.event,
                    &ticket_type.name,
                    &ticket_type.price,
                    &(ticket_type.quantity_total as i32),
                    &(ticket_type.quantity_sold as i32),
                ],
            )
            .await
            .map(drop)
    }
}

fn decode_ticket_type(row: tokio_postgres::Row) -> TicketType {
    TicketType {
        id: row.get("id"),
        event: row.get("event_id"),
        name: row.get("name"),
        price: row.get("price"),
        quantity_total: usize::try_from(row.get::<_, i32>("quantity_total"))
            .unwrap(),
        quantity_sold: usize::try_from(row.get::<_, i32>("quantity_sold"))
            .unwrap(),
    }
}
