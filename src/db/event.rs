use std::{collections::HashMap, error::Error as StdError};

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

use super::{bank_account, user, Client};

#[derive(Clone, Debug)]
pub struct Event {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub start_date: OffsetDateTime,
    pub end_date: OffsetDateTime,
    pub location: String,
    pub cover_image_url: Option<String>,
    pub organizer: user::Id,
    pub bank_account: bank_account::Id,
    pub status: Status,
    pub created_at: OffsetDateTime,
}

impl Event {
    /// Whether `reviewer` may approve or reject payments for this event:
    /// admins always, organizers only for their own events.
    pub fn reviewable_by(&self, reviewer: &user::User) -> bool {
        match reviewer.role {
            user::Role::Admin => true,
            user::Role::Organizer => self.organizer == reviewer.id,
            user::Role::User => false,
        }
    }
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
    /// Not visible to buyers.
    Draft = 1,

    /// Submitted by an organizer, awaiting an admin publish.
    Pending = 2,

    /// Listed publicly and open for reservations.
    Published = 3,

    /// Kept in the model for forward compatibility; no operation currently
    /// produces it.
    Cancelled = 4,
}

impl Status {
    /// Admin publish toggle: PUBLISHED backs off to DRAFT, anything else
    /// goes live.
    pub fn toggled(self) -> Self {
        match self {
            Self::Published => Self::Draft,
            Self::Draft | Self::Pending | Self::Cancelled => Self::Published,
        }
    }
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
    pub async fn get_event_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Event>, Error> {
        const SQL: &str = "\
            SELECT id, title, slug, description, start_date, \
                   end_date, location, cover_image_url, organizer_id, \
                   bank_account_id, status, created_at \
            FROM events \
            WHERE id = $1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.map(decode_event))
    }

    pub async fn get_event_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Event>, Error> {
        const SQL: &str = "\
            SELECT id, title, slug, description, start_date, \
                   end_date, location, cover_image_url, organizer_id, \
                   bank_account_id, status, created_at \
            FROM events \
            WHERE slug = $1";
        Ok(self.0.query_opt(SQL, &[&slug]).await?.map(decode_event))
    }

    pub async fn get_events_by_ids(
        &self,
        ids: &[Id],
    ) -> Result<HashMap<Id, Event>, Error> {
        const SQL: &str = "\
            SELECT id, title, slug, description, start_date, \
                   end_date, location, cover_image_url, organizer_id, \
                   bank_account_id, status, created_at \
            FROM events \
            WHERE id IN (SELECT unnest($1::UUID[])) \
            LIMIT $2";

        let limit = i64::try_from(ids.len()).unwrap();

        Ok(self
            .0
            .query(SQL, &[&ids, &limit])
            .await?
            .into_iter()
            .map(|row| {
                let event = decode_event(row);
                (event.id, event)
            })
            .collect())
    }

    pub async fn write_event(&self, event: &Event) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO events (id, title, slug, description, start_date, \
                                end_date, location, cover_image_url, \
                                organizer_id, bank_account_id, status, \
                                created_at) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
            ON CONFLICT (id) DO UPDATE \
            SET title = EXCLUDED.title, \
                slug = EXCLUDED.slug, \
                description = EXCLUDED.description, \
                start_date = EXCLUDED.start_date, \
                end_date = EXCLUDED.end_date, \
                location = EXCLUDED.location, \
                cover_image_url = EXCLUDED.cover_image_url, \
                organizer_id = EXCLUDED.organizer_id, \
                bank_account_id = EXCLUDED.bank_account_id, \
                status = EXCLUDED.status";

        self.0
            .execute(
                SQL,
                &[
                    &event.id,
                    &event.title,
                    &event.slug,
                    &event.description,
                    &event.start_date,
                    &event.end_date,
                    &event.location,
                    &event.cover_image_url,
                    &event.organizer,
                    &event.bank_account,
                    &event.status,
                    &event.created_at,
                ],
            )
            .await
            .map(drop)
    }

    /// Buyer-facing page: published events only.
    pub async fn get_published_events_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Event>, Error> {
        let offset = i64::try_from(offset).unwrap();
        let limit = i64::try_from(limit).unwrap();

        const SQL: &str = "\
            SELECT id, title, slug, description, start_date, \
                   end_date, location, cover_image_url, organizer_id, \
                   bank_account_id, status, created_at \
            FROM events \
            WHERE status = $1 \
            ORDER BY start_date ASC, id ASC \
            OFFSET $2 LIMIT $3";
        Ok(self
            .0
            .query(SQL, &[&Status::Published, &offset, &limit])
            .await?
            .into_iter()
            .map(decode_event)
            .collect())
    }

    pub async fn get_published_events_count(&self) -> Result<usize, Error> {
        const SQL: &str = "SELECT COUNT(*) FROM events WHERE status = $1";
        Ok(self
            .0
            .query_one(SQL, &[&Status::Published])
            .await?
            .get::<_, i64>(0)
            .try_into()
            .unwrap())
    }

    /// Admin view: all statuses.
    pub async fn get_events(&self) -> Result<Vec<Event>, Error> {
        const SQL: &str = "\
            SELECT id, title, slug, description, start_date, \
                   end_date, location, cover_image_url, organizer_id, \
                   bank_account_id, status, created_at \
            FROM events \
            ORDER BY created_at DESC, id DESC";
        Ok(self
            .0
            .query(SQL, &[])
            .await?
            .into_iter()
            .map(decode_event)
            .collect())
    }

    pub async fn get_events_by_organizer(
        &self,
        organizer: user::Id,
    ) -> Result<Vec<Event>, Error> {
        const SQL: &str = "\
            SELECT id, title, slug, description, start_date, \
                   end_date, location, cover_image_url, organizer_id, \
                   bank_account_id, status, created_at \
            FROM events \
            WHERE organizer_id = $1 \
            ORDER BY created_at DESC, id DESC";
        Ok(self
            .0
            .query(SQL, &[&organizer])
            .await?
            .into_iter()
            .map(decode_event)
            .collect())
    }
}

fn decode_event(row: tokio_postgres::Row) -> Event {
    Event {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        location: row.get("location"),
        cover_image_url: row.get("cover_image_url"),
        organizer: row.get("organizer_id"),
        bank_account: row.get("bank_account_id"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}
