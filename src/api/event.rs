use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api;

pub use crate::db::event::{Id, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub location: String,
    pub cover_image_url: Option<String>,
    pub status: Status,
    pub organizer: api::user::Summary,
    pub bank_account_id: api::bank_account::Id,
}

/// Just enough of an event to label a payment or ticket.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub id: Id,
    pub title: String,
    pub slug: String,
}

impl From<&crate::db::Event> for Summary {
    fn from(event: &crate::db::Event) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            slug: event.slug.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub events: Vec<Event>,
    pub total_count: usize,
}

/// Buyer-facing event page: tiers to pick from plus the transfer
/// destination.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    pub event: Event,
    pub ticket_types: Vec<api::TicketType>,
    pub bank_account: api::BankAccount,
}
