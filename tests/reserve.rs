pub mod common;

use addis_tickets::api;
use reqwest::StatusCode;

/// Publishes a fresh event with one tier and returns its slug and the
/// tier's id.
async fn published_event(
    organizer: &common::Client,
    price: i64,
) -> (String, api::ticket_type::Id) {
    let account = organizer
        .add_bank_account("CBE", "1000555566667", "Test Events")
        .await
        .expect("failed to add a bank account");
    let slug = common::unique_slug("show");
    let event = organizer
        .add_event("Test Show", &slug, account.id)
        .await
        .expect("failed to add an event");
    let tier = organizer
        .add_ticket_type(event.id, "Regular", price, 100)
        .await
        .expect("failed to add a ticket type");
    common::admin()
        .await
        .toggle_publish(event.id)
        .await
        .expect("failed to publish");
    (slug, tier.id)
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn reserving_creates_a_pending_payment() {
    let organizer = common::signup_organizer("Betty").await;
    let (slug, tier) = published_event(&organizer, 10000).await;

    let (buyer, _) = common::Client::signup_buyer("Yonas").await;
    let payment = buyer
        .reserve(tier, &slug)
        .await
        .expect("failed to reserve");
    assert_eq!(payment.status, api::payment::Status::Pending);
    assert_eq!(payment.amount, 10000);
    assert_eq!(payment.currency, "ETB");
    assert!(payment.receipt_image_url.starts_with("/uploads/"));

    let mine = buyer.my_tickets().await.expect("failed to list tickets");
    assert!(mine.tickets.is_empty());
    assert_eq!(mine.pending_reservations.len(), 1);
    assert_eq!(mine.pending_reservations[0].payment_id, payment.id);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn reserving_without_a_receipt_is_rejected() {
    let organizer = common::signup_organizer("Marta").await;
    let (slug, tier) = published_event(&organizer, 5000).await;

    let (buyer, _) = common::Client::signup_buyer("Kidus").await;
    let err = buyer
        .reserve_without_receipt(tier, &slug)
        .await
        .expect_err("a reservation without a receipt must fail");
    assert_eq!(err, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn tier_must_belong_to_the_named_event() {
    let organizer = common::signup_organizer("Selam").await;
    let (slug_a, _) = published_event(&organizer, 10000).await;
    let (_, tier_b) = published_event(&organizer, 20000).await;

    let (buyer, _) = common::Client::signup_buyer("Robel").await;
    let err = buyer
        .reserve(tier_b, &slug_a)
        .await
        .expect_err("a mismatched tier must fail");
    assert_eq!(err, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn reserving_requires_authentication() {
    let organizer = common::signup_organizer("Helen").await;
    let (slug, tier) = published_event(&organizer, 10000).await;

    let err = common::Client::new()
        .reserve(tier, &slug)
        .await
        .expect_err("anonymous reservations must fail");
    assert_eq!(err, StatusCode::UNAUTHORIZED);
}
