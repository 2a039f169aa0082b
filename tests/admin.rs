pub mod common;

use addis_tickets::api;
use reqwest::StatusCode;

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn role_changes_apply_on_the_next_request() {
    let (client, _) = common::Client::signup_buyer("Aster").await;
    let me = client.user().await.expect("failed to load the user");

    // Not an organizer yet.
    let err = client
        .add_bank_account("CBE", "1000777788889", "Aster")
        .await
        .expect_err("buyers must not manage bank accounts");
    assert_eq!(err, StatusCode::FORBIDDEN);

    common::admin()
        .await
        .set_user_role(me.id, api::user::Role::Organizer)
        .await
        .expect("failed to promote");

    // Same token, new powers.
    client
        .add_bank_account("CBE", "1000777788889", "Aster")
        .await
        .expect("a promoted organizer must manage bank accounts");
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn role_changes_are_admin_only() {
    let (client, _) = common::Client::signup_buyer("Fikir").await;
    let me = client.user().await.expect("failed to load the user");

    let err = client
        .set_user_role(me.id, api::user::Role::Admin)
        .await
        .expect_err("self promotion must fail");
    assert_eq!(err, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn admins_enumerate_every_account() {
    let (client, email) = common::Client::signup_buyer("Eyerus").await;
    let me = client.user().await.expect("failed to load the user");

    // Newest accounts come first, so the fresh signup is on page one.
    let page = common::admin()
        .await
        .list_users(0, 50)
        .await
        .expect("failed to list users");
    let listed = page
        .users
        .iter()
        .find(|user| user.id == me.id)
        .expect("the new account must be listed");
    assert_eq!(listed.email, email);
    assert!(page.total_count >= page.users.len());
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn user_enumeration_is_admin_only() {
    let (client, _) = common::Client::signup_buyer("Saron").await;
    let err = client
        .list_users(0, 50)
        .await
        .expect_err("buyers must not enumerate accounts");
    assert_eq!(err, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn financials_split_fee_and_vat_per_payment() {
    let admin = common::admin().await;
    let before = admin.financials().await.expect("failed to load financials");

    let organizer = common::signup_organizer("Mahi").await;
    let account = organizer
        .add_bank_account("Dashen", "5000666677778", "Mahi Events")
        .await
        .expect("failed to add a bank account");
    let slug = common::unique_slug("expo");
    let event = organizer
        .add_event("Tech Expo", &slug, account.id)
        .await
        .expect("failed to add an event");
    let tier = organizer
        .add_ticket_type(event.id, "Standard", 10000, 50)
        .await
        .expect("failed to add a ticket type");
    admin
        .toggle_publish(event.id)
        .await
        .expect("failed to publish");

    let (buyer, _) = common::Client::signup_buyer("Henok").await;
    let payment = buyer
        .reserve(tier.id, &slug)
        .await
        .expect("failed to reserve");
    organizer
        .approve_payment(payment.id)
        .await
        .expect("failed to approve");

    let after = admin.financials().await.expect("failed to load financials");
    // 5% fee on 10000 is 500, 15% VAT on the fee is 75, leaving 425.
    assert_eq!(after.revenue - before.revenue, 10000);
    assert_eq!(after.service_fee - before.service_fee, 500);
    assert_eq!(after.vat - before.vat, 75);
    assert_eq!(after.admin_profit - before.admin_profit, 425);

    let recent = after
        .recent_payments
        .iter()
        .find(|p| p.id == payment.id)
        .expect("the payment must appear in recents");
    assert_eq!(recent.service_fee, 500);
    assert_eq!(recent.vat, 75);
    assert_eq!(recent.profit, 425);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn organizer_finance_counts_issued_tickets() {
    let admin = common::admin().await;

    let organizer = common::signup_organizer("Lulit").await;
    let account = organizer
        .add_bank_account("CBE", "1000444455556", "Lulit Events")
        .await
        .expect("failed to add a bank account");
    let slug = common::unique_slug("fair");
    let event = organizer
        .add_event("Book Fair", &slug, account.id)
        .await
        .expect("failed to add an event");
    let tier = organizer
        .add_ticket_type(event.id, "Entry", 2000, 200)
        .await
        .expect("failed to add a ticket type");
    admin
        .toggle_publish(event.id)
        .await
        .expect("failed to publish");

    let (buyer, _) = common::Client::signup_buyer("Natnael").await;
    let payment = buyer
        .reserve(tier.id, &slug)
        .await
        .expect("failed to reserve");
    organizer
        .approve_payment(payment.id)
        .await
        .expect("failed to approve");

    let me = organizer.user().await.expect("failed to load the user");
    let rows = admin
        .organizers_finance()
        .await
        .expect("failed to load the rollup");
    let row = rows
        .iter()
        .find(|row| row.organizer.id == me.id)
        .expect("the organizer must appear in the rollup");
    assert_eq!(row.tickets_sold, 1);
    assert_eq!(row.revenue, 2000);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn financials_are_admin_only() {
    let organizer = common::signup_organizer("Yared").await;
    let err = organizer
        .financials()
        .await
        .expect_err("organizers must not see platform financials");
    assert_eq!(err, StatusCode::FORBIDDEN);
}
