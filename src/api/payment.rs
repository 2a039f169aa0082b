use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api;

pub use crate::db::payment::{Id, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Id,
    pub amount: i64,
    pub currency: String,
    pub status: Status,
    pub receipt_image_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
    pub user: api::User,
    pub event: api::event::Summary,
    pub ticket_type: api::TicketType,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub payments: Vec<Payment>,
    pub total_count: usize,
}

/// Outcome of a review verb: the reviewed payment, and the issued ticket
/// for an approval.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub payment: Payment,
    pub ticket: Option<api::Ticket>,
}
