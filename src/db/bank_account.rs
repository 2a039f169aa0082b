use std::error::Error as StdError;

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

use super::{user, Client};

/// Destination account for buyer bank transfers. Shown on the reservation
/// page of every event that references it.
#[derive(Clone, Debug)]
pub struct BankAccount {
    pub id: Id,
    pub organizer: user::Id,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub instructions: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
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

impl Client {
    pub async fn get_bank_account_by_id(
        &self,
        id: Id,
    ) -> Result<Option<BankAccount>, Error> {
        const SQL: &str = "\
            SELECT id, organizer_id, bank_name, account_number, \
                   account_holder, instructions, created_at \
            FROM bank_accounts \
            WHERE id = $1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.map(decode_account))
    }

    pub async fn get_bank_accounts_by_organizer(
        &self,
        organizer: user::Id,
    ) -> Result<Vec<BankAccount>, Error> {
        const SQL: &str = "\
            SELECT id, organizer_id, bank_name, account_number, \
                   account_holder, instructions, created_at \
            FROM bank_accounts \
            WHERE organizer_id = $1 \
            ORDER BY created_at DESC, id DESC";
        Ok(self
            .0
            .query(SQL, &[&organizer])
            .await?
            .into_iter()
            .map(decode_account)
            .collect())
    }

    pub async fn get_bank_accounts(&self) -> Result<Vec<BankAccount>, Error> {
        const SQL: &str = "\
            SELECT id, organizer_id, bank_name, account_number, \
                   account_holder, instructions, created_at \
            FROM bank_accounts \
            ORDER BY created_at DESC, id DESC";
        Ok(self
            .0
            .query(SQL, &[])
            .await?
            .into_iter()
            .map(decode_account)
            .collect())
    }

    pub async fn write_bank_account(
        &self,
        account: &BankAccount,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO bank_accounts (id, organizer_id, bank_name, \
                                       account_number, account_holder, \
                                       instructions, created_at) \
            VALUES ($1, $2, $3, $4, $5, $6, $7)";

        self.0
            .execute(
                SQL,
                &[
                    &account.id,
                    &account.organizer,
                    &account.bank_name,
                    &account.account_number,
                    &account.account_holder,
                    &account.instructions,
                    &account.created_at,
                ],
            )
            .await
            .map(drop)
    }
}

fn decode_account(row: tokio_postgres::Row) -> BankAccount {
    BankAccount {
        id: row.get("id"),
        organizer: row.get("organizer_id"),
        bank_name: row.get("bank_name"),
        account_number: row.get("account_number"),
        account_holder: row.get("account_holder"),
        instructions: row.get("instructions"),
        created_at: row.get("created_at"),
    }
}
