use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api;

pub use crate::db::ticket::{Id, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub event: api::event::Summary,
    pub ticket_type_name: String,
}

/// A reservation still awaiting review, shown alongside real tickets on
/// the buyer's page.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReservation {
    pub payment_id: api::payment::Id,
    pub amount: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub event: api::event::Summary,
    pub ticket_type_name: String,
    pub receipt_image_url: String,
}

/// Response of the buyer's ticket listing.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mine {
    pub tickets: Vec<Ticket>,
    pub pending_reservations: Vec<PendingReservation>,
}
