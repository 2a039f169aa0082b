pub mod common;

use addis_tickets::api;
use reqwest::StatusCode;

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn signup_and_login_retrieves_a_token() {
    let (client, _) = common::Client::signup_buyer("Abel").await;
    assert!(client.auth_token.is_some());
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn new_accounts_start_as_buyers() {
    let (client, email) = common::Client::signup_buyer("Hanna").await;
    let me = client.user().await.expect("failed to load the user");
    assert_eq!(me.email, email);
    assert_eq!(me.role, api::user::Role::User);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn duplicate_email_is_rejected() {
    let email = common::unique_email("sara");
    let client = common::Client::new();
    client
        .signup("Sara", &email, "password")
        .await
        .expect("first signup failed");

    let err = client
        .signup("Sara", &email, "password")
        .await
        .expect_err("second signup must fail");
    assert_eq!(err, StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "requires a running server and a seeded database"]
async fn requests_without_a_token_are_unauthorized() {
    let err = common::Client::new()
        .user()
        .await
        .expect_err("must be unauthorized");
    assert_eq!(err, StatusCode::UNAUTHORIZED);
}
