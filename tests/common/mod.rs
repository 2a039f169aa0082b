use addis_tickets::api;
use constcat::concat;
use reqwest::{multipart, StatusCode};
use serde_json::json;
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:3000";

pub struct Client {
    inner: reqwest::Client,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
            auth_token: None,
        }
    }

    /// Signs up a fresh buyer account with a unique email and logs in.
    pub async fn signup_buyer(name: &str) -> (Self, String) {
        let email = unique_email(name);
        let client = Self::new();
        client
            .signup(name, &email, "password")
            .await
            .expect("signup failed");
        (client.auth(&email, "password").await, email)
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<api::User, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/signup");

        Ok(self
            .inner
            .post(URL)
            .json(&json!({
                "name": name,
                "email": email,
                "password": password,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::User>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn auth(mut self, email: &str, password: &str) -> Self {
        const URL: &str = concat!(BASE_URL, "/api/auth");

        self.auth_token = Some(
            self.inner
                .post(URL)
                .json(&json!({
                    "email": email,
                    "password": password,
                }))
                .send()
                .await
                .expect("failed to send a request")
                .error_for_status()
                .expect("wrong status code")
                .text()
                .await
                .expect("failed to get a response"),
        );

        self
    }

    pub async fn user(&self) -> Result<api::User, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/user");

        Ok(self
            .request(self.inner.get(URL))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::User>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn list_events(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<api::event::List, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/events");

        Ok(self
            .request(
                self.inner
                    .get(format!("{URL}?offset={offset}&limit={limit}")),
            )
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::event::List>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn get_event(
        &self,
        slug: &str,
    ) -> Result<api::event::Detail, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/events");

        Ok(self
            .request(self.inner.get(format!("{URL}/{slug}")))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::event::Detail>()
            .await
            .expect("failed to get a response"))
    }

    /// Fetches an event page as raw JSON, for assertions on the exact
    /// wire shape.
    pub async fn get_event_raw(
        &self,
        slug: &str,
    ) -> Result<serde_json::Value, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/events");

        Ok(self
            .request(self.inner.get(format!("{URL}/{slug}")))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<serde_json::Value>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn reserve(
        &self,
        ticket_type_id: api::ticket_type::Id,
        slug: &str,
    ) -> Result<api::payment::Payment, StatusCode> {
        let form = multipart::Form::new()
            .text("ticketTypeId", ticket_type_id.to_string())
            .text("slug", slug.to_owned())
            .part(
                "screenshot",
                multipart::Part::bytes(b"not a real receipt".to_vec())
                    .file_name("receipt.png"),
            );
        self.reserve_form(form).await
    }

    /// Sends a reservation without a receipt file.
    pub async fn reserve_without_receipt(
        &self,
        ticket_type_id: api::ticket_type::Id,
        slug: &str,
    ) -> Result<api::payment::Payment, StatusCode> {
        let form = multipart::Form::new()
            .text("ticketTypeId", ticket_type_id.to_string())
            .text("slug", slug.to_owned());
        self.reserve_form(form).await
    }

    async fn reserve_form(
        &self,
        form: multipart::Form,
    ) -> Result<api::payment::Payment, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/reserve");

        Ok(self
            .request(self.inner.post(URL))
            .multipart(form)
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::payment::Payment>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn my_tickets(&self) -> Result<api::ticket::Mine, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/tickets");

        Ok(self
            .request(self.inner.get(URL))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::ticket::Mine>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn add_bank_account(
        &self,
        bank_name: &str,
        account_number: &str,
        account_holder: &str,
    ) -> Result<api::BankAccount, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/organizer/bank-accounts");

        Ok(self
            .request(self.inner.post(URL))
            .json(&json!({
                "bankName": bank_name,
                "accountNumber": account_number,
                "accountHolder": account_holder,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::BankAccount>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn add_event(
        &self,
        title: &str,
        slug: &str,
        bank_account_id: api::bank_account::Id,
    ) -> Result<api::Event, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/organizer/events");

        Ok(self
            .request(self.inner.post(URL))
            .json(&json!({
                "title": title,
                "slug": slug,
                "startDate": "2026-12-01T18:00:00Z",
                "endDate": "2026-12-01T23:00:00Z",
                "location": "Addis Ababa",
                "bankAccountId": bank_account_id,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::Event>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn add_ticket_type(
        &self,
        event_id: api::event::Id,
        name: &str,
        price: i64,
        quantity_total: usize,
    ) -> Result<api::TicketType, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/organizer/events");

        Ok(self
            .request(
                self.inner.post(format!("{URL}/{event_id}/ticket-types")),
            )
            .json(&json!({
                "name": name,
                "price": price,
                "quantityTotal": quantity_total,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::TicketType>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn pending_payments(
        &self,
    ) -> Result<api::payment::List, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/organizer/payments");

        Ok(self
            .request(self.inner.get(URL))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::payment::List>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn approve_payment(
        &self,
        id: api::payment::Id,
    ) -> Result<api::payment::Review, StatusCode> {
        self.review_payment(id, "approve").await
    }

    pub async fn reject_payment(
        &self,
        id: api::payment::Id,
    ) -> Result<api::payment::Review, StatusCode> {
        self.review_payment(id, "reject").await
    }

    async fn review_payment(
        &self,
        id: api::payment::Id,
        verb: &str,
    ) -> Result<api::payment::Review, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/organizer/payments");

        Ok(self
            .request(self.inner.post(format!("{URL}/{id}/{verb}")))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::payment::Review>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn toggle_publish(
        &self,
        id: api::event::Id,
    ) -> Result<api::Event, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/admin/events");

        Ok(self
            .request(self.inner.post(format!("{URL}/{id}/publish")))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::Event>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn list_users(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<api::user::List, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/admin/users");

        Ok(self
            .request(
                self.inner
                    .get(format!("{URL}?offset={offset}&limit={limit}")),
            )
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::user::List>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn set_user_role(
        &self,
        id: api::user::Id,
        role: api::user::Role,
    ) -> Result<api::User, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/admin/users");

        Ok(self
            .request(self.inner.post(format!("{URL}/{id}/role")))
            .json(&json!({ "role": role }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::User>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn financials(
        &self,
    ) -> Result<api::report::Financials, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/admin/financials");

        Ok(self
            .request(self.inner.get(URL))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::report::Financials>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn organizers_finance(
        &self,
    ) -> Result<Vec<api::report::OrganizerFinance>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/admin/organizers/finance");

        Ok(self
            .request(self.inner.get(URL))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<Vec<api::report::OrganizerFinance>>()
            .await
            .expect("failed to get a response"))
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => {
                req.header("Authorization", format!("Bearer {token}"))
            }
            None => req,
        }
    }
}

/// Logs in as the seeded admin account.
pub async fn admin() -> Client {
    Client::new().auth(ADMIN_EMAIL, ADMIN_PASSWORD).await
}

/// Signs up a fresh account and has the admin promote it to ORGANIZER.
pub async fn signup_organizer(name: &str) -> Client {
    let (client, _) = Client::signup_buyer(name).await;
    let me = client.user().await.expect("failed to load the user");
    admin()
        .await
        .set_user_role(me.id, api::user::Role::Organizer)
        .await
        .expect("failed to promote the organizer");
    client
}

pub fn unique_email(name: &str) -> String {
    format!("{name}-{}@example.com", Uuid::new_v4().simple())
}

pub fn unique_slug(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Admin credentials expected to be seeded in the test database.
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "password";
