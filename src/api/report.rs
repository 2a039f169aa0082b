use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api;

/// Platform-wide revenue rollup, recomputed from approved payments on
/// every request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Financials {
    pub revenue: i64,
    pub service_fee: i64,
    pub vat: i64,
    pub admin_profit: i64,
    pub recent_payments: Vec<RecentPayment>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentPayment {
    pub id: api::payment::Id,
    pub amount: i64,
    pub service_fee: i64,
    pub vat: i64,
    pub profit: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub user: api::User,
    pub event: api::event::Summary,
    pub ticket_type_name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerFinance {
    pub organizer: api::User,
    pub tickets_sold: usize,
    pub revenue: i64,
}
