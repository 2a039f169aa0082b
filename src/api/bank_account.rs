use serde::{Deserialize, Serialize};

use crate::{api, db};

pub use crate::db::bank_account::Id;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub id: Id,
    pub organizer_id: api::user::Id,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub instructions: Option<String>,
}

impl From<&db::BankAccount> for BankAccount {
    fn from(account: &db::BankAccount) -> Self {
        Self {
            id: account.id,
            organizer_id: account.organizer,
            bank_name: account.bank_name.clone(),
            account_number: account.account_number.clone(),
            account_holder: account.account_holder.clone(),
            instructions: account.instructions.clone(),
        }
    }
}
