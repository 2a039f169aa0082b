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

use super::{event, ticket, ticket_type, user, Client};

/// A buyer's claimed bank transfer, awaiting organizer/admin confirmation.
///
/// `amount` is copied from the ticket type's price at submission time, so a
/// later price change never affects an already-submitted payment. Payments
/// are never deleted.
#[derive(Clone, Debug)]
pub struct Payment {
    pub id: Id,
    pub user: user::Id,
    pub event: event::Id,
    pub ticket_type: ticket_type::Id,
    /// Minor currency units (cents).
    pub amount: i64,
    pub currency: String,
    pub payment_method: String,
    pub receipt_image_url: String,
    pub status: Status,
    pub reviewed_by: Option<user::Id>,
    pub reviewed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

pub const DEFAULT_CURRENCY: &str = "ETB";
pub const DEFAULT_METHOD: &str = "BANK_TRANSFER";

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
    /// Submitted, not reviewed yet. The only state a payment may leave.
    Pending = 1,

    /// Terminal. Exactly one ticket was issued in the same statement.
    Approved = 2,

    /// Terminal. No ticket, no counter change.
    Rejected = 3,
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
    pub async fn get_payment_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Payment>, Error> {
        const SQL: &str = "\
            SELECT id, user_id, event_id, ticket_type_id, amount, currency, \
                   payment_method, receipt_image_url, status, reviewed_by, \
                   reviewed_at, created_at \
            FROM payments \
            WHERE id = $1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.map(decode_payment))
    }

    pub async fn write_payment(&self, payment: &Payment) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO payments (id, user_id, event_id, ticket_type_id, \
                                  amount, currency, payment_method, \
                                  receipt_image_url, status, reviewed_by, \
                                  reviewed_at, created_at) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

        self.0
            .execute(
                SQL,
                &[
                    &payment.id,
                    &payment.user,
                    &payment.event,
                    &payment.ticket_type,
                    &payment.amount,
                    &payment.currency,
                    &payment.payment_method,
                    &payment.receipt_image_url,
                    &payment.status,
                    &payment.reviewed_by,
                    &payment.reviewed_at,
                    &payment.created_at,
                ],
            )
            .await
            .map(drop)
    }

    /// Approves a PENDING payment and issues its ticket as one atomic
    /// statement: the transition is conditional on `status = PENDING`, the
    /// sold counter bump and the ticket insert both read from the updated
    /// row. A concurrent duplicate approval matches zero rows and returns
    /// `false`, so a payment can never produce two tickets.
    pub async fn approve_payment(
        &self,
        id: Id,
        reviewer: user::Id,
        reviewed_at: OffsetDateTime,
        ticket_id: ticket::Id,
    ) -> Result<bool, Error> {
        const SQL: &str = "\
            WITH approved AS (\
                UPDATE payments \
                SET status = $2, reviewed_by = $3, reviewed_at = $4 \
                WHERE id = $1 AND status = $5 \
                RETURNING user_id, event_id, ticket_type_id\
            ), sold AS (\
                UPDATE ticket_types \
                SET quantity_sold = quantity_sold + 1 \
                WHERE id IN (SELECT ticket_type_id FROM approved)\
            ) \
            INSERT INTO tickets (id, user_id, event_id, ticket_type_id, \
                                 status, created_at) \
            SELECT $6, user_id, event_id, ticket_type_id, $7, $4 \
            FROM approved \
            RETURNING id";

        Ok(self
            .0
            .query_opt(
                SQL,
                &[
                    &id,
                    &Status::Approved,
                    &reviewer,
                    &reviewed_at,
                    &Status::Pending,
                    &ticket_id,
                    &ticket::Status::Valid,
                ],
            )
            .await?
            .is_some())
    }

    /// Rejects a PENDING payment. Returns `false` when the payment was
    /// already reviewed (terminal states never change again).
    pub async fn reject_payment(
        &self,
        id: Id,
        reviewer: user::Id,
        reviewed_at: OffsetDateTime,
    ) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE payments \
            SET status = $2, reviewed_by = $3, reviewed_at = $4 \
            WHERE id = $1 AND status = $5";
        Ok(self
            .0
            .execute(
                SQL,
                &[&id, &Status::Rejected, &reviewer, &reviewed_at, &Status::Pending],
            )
            .await?
            == 1)
    }

    /// PENDING payments for review, newest first. `organizer` scopes to
    /// that organizer's events; `None` is the admin view.
    pub async fn get_pending_payments_page(
        &self,
        organizer: Option<user::Id>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Payment>, Error> {
        let offset = i64::try_from(offset).unwrap();
        let limit = i64::try_from(limit).unwrap();

        const ALL_SQL: &str = "\
            SELECT id, user_id, event_id, ticket_type_id, amount, currency, \
                   payment_method, receipt_image_url, status, reviewed_by, \
                   reviewed_at, created_at \
            FROM payments \
            WHERE status = $1 \
            ORDER BY created_at DESC, id DESC \
            OFFSET $2 LIMIT $3";
        const SCOPED_SQL: &str = "\
            SELECT p.id, p.user_id, p.event_id, p.ticket_type_id, p.amount, \
                   p.currency, p.payment_method, p.receipt_image_url, \
                   p.status, p.reviewed_by, p.reviewed_at, p.created_at \
            FROM payments p \
            JOIN events e ON e.id = p.event_id \
            WHERE p.status = $1 AND e.organizer_id = $2 \
            ORDER BY p.created_at DESC, p.id DESC \
            OFFSET $3 LIMIT $4";

        let rows = match organizer {
            None => {
                self.0
                    .query(ALL_SQL, &[&Status::Pending, &offset, &limit])
                    .await?
            }
            Some(organizer) => {
                self.0
                    .query(
                        SCOPED_SQL,
                        &[&Status::Pending, &organizer, &offset, &limit],
                    )
                    .await?
            }
        };
        Ok(rows.into_iter().map(decode_payment).collect())
    }

    pub async fn get_pending_payments_count(
        &self,
        organizer: Option<user::Id>,
    ) -> Result<usize, Error> {
        const ALL_SQL: &str =
            "SELECT COUNT(*) FROM payments WHERE status = $1";
        const SCOPED_SQL: &str = "\
            SELECT COUNT(*) \
            FROM payments p \
            JOIN events e ON e.id = p.event_id \
            WHERE p.status = $1 AND e.organizer_id = $2";

        let row = match organizer {
            None => self.0.query_one(ALL_SQL, &[&Status::Pending]).await?,
            Some(organizer) => {
                self.0
                    .query_one(SCOPED_SQL, &[&Status::Pending, &organizer])
                    .await?
            }
        };
        Ok(row.get::<_, i64>(0).try_into().unwrap())
    }

    pub async fn get_pending_payments_by_user(
        &self,
        user: user::Id,
    ) -> Result<Vec<Payment>, Error> {
        const SQL: &str = "\
            SELECT id, user_id, event_id, ticket_type_id, amount, currency, \
                   payment_method, receipt_image_url, status, reviewed_by, \
                   reviewed_at, created_at \
            FROM payments \
            WHERE user_id = $1 AND status = $2 \
            ORDER BY created_at DESC, id DESC";
        Ok(self
            .0
            .query(SQL, &[&user, &Status::Pending])
            .await?
            .into_iter()
            .map(decode_payment)
            .collect())
    }

    /// Amounts of all APPROVED payments, for the per-payment fee rollup.
    pub async fn get_approved_amounts(&self) -> Result<Vec<i64>, Error> {
        const SQL: &str = "SELECT amount FROM payments WHERE status = $1";
        Ok(self
            .0
            .query(SQL, &[&Status::Approved])
            .await?
            .into_iter()
            .map(|row| row.get(0))
            .collect())
    }

    pub async fn get_recent_approved_payments(
        &self,
        limit: usize,
    ) -> Result<Vec<Payment>, Error> {
        let limit = i64::try_from(limit).unwrap();

        const SQL: &str = "\
            SELECT id, user_id, event_id, ticket_type_id, amount, currency, \
                   payment_method, receipt_image_url, status, reviewed_by, \
                   reviewed_at, created_at \
            FROM payments \
            WHERE status = $1 \
            ORDER BY created_at DESC, id DESC \
            LIMIT $2";
        Ok(self
            .0
            .query(SQL, &[&Status::Approved, &limit])
            .await?
            .into_iter()
            .map(decode_payment)
            .collect())
    }

    /// Summed APPROVED amounts across one organizer's events.
    pub async fn get_approved_total_by_organizer(
        &self,
        organizer: user::Id,
    ) -> Result<i64, Error> {
        const SQL: &str = "\
            SELECT COALESCE(SUM(p.amount), 0)::BIGINT \
            FROM payments p \
            JOIN events e ON e.id = p.event_id \
            WHERE p.status = $1 AND e.organizer_id = $2";
        Ok(self
            .0
            .query_one(SQL, &[&Status::Approved, &organizer])
            .await?
            .get(0))
    }
}

fn decode_payment(row: tokio_postgres::Row) -> Payment {
    Payment {
        id: row.get("id"),
        user: row.get("user_id"),
        event: row.get("event_id"),
        ticket_type: row.get("ticket_type_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        payment_method: row.get("payment_method"),
        receipt_image_url: row.get("receipt_image_url"),
        status: row.get("status"),
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
        created_at: row.get("created_at"),
    }
}
