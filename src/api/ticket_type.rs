use serde::{Deserialize, Serialize};

use crate::{api, db};

pub use crate::db::ticket_type::Id;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: Id,
    pub event_id: api::event::Id,
    pub name: String,
    pub price: i64,
    pub quantity_total: usize,
    pub quantity_sold: usize,
}

impl From<&db::TicketType> for TicketType {
    fn from(tt: &db::TicketType) -> Self {
        Self {
            id: tt.id,
            event_id: tt.event,
            name: tt.name.clone(),
            price: tt.price,
            quantity_total: tt.quantity_total,
            quantity_sold: tt.quantity_sold,
        }
    }
}
