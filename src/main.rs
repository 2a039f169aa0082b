use std::{error::Error, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Multipart, Path, Query, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use futures::future::try_join_all;
use itertools::Itertools as _;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{fs, net, task};
use tokio_postgres::error::SqlState;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};
use uuid::Uuid;

use addis_tickets::{api, db, fees, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let (db_client, db_connection) = db::connect(config.db).await?;

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            panic!("database connection failed: {e}");
        }
    });

    fs::create_dir_all(&config.uploads.dir).await?;

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let app = Router::new()
        .route("/api/signup", post(signup))
        .route("/api/auth", post(auth))
        .route("/api/user", get(get_user))
        .route("/api/events", get(list_events))
        .route("/api/events/:slug", get(get_event))
        .route("/api/reserve", post(reserve))
        .route("/api/tickets", get(my_tickets))
        .route(
            "/api/organizer/events",
            get(organizer_list_events).post(organizer_add_event),
        )
        .route(
            "/api/organizer/events/:id",
            get(staff_get_event).patch(staff_edit_event),
        )
        .route(
            "/api/organizer/events/:id/ticket-types",
            get(list_ticket_types).post(add_ticket_type),
        )
        .route(
            "/api/organizer/bank-accounts",
            get(organizer_list_bank_accounts).post(organizer_add_bank_account),
        )
        .route("/api/organizer/payments", get(list_pending_payments))
        .route("/api/organizer/payments/:id/approve", post(approve_payment))
        .route("/api/organizer/payments/:id/reject", post(reject_payment))
        .route(
            "/api/admin/events",
            get(admin_list_events).post(admin_add_event),
        )
        .route(
            "/api/admin/events/:id",
            get(staff_get_event).patch(staff_edit_event),
        )
        .route("/api/admin/events/:id/publish", post(toggle_publish))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/role", post(set_user_role))
        .route("/api/admin/organizers", get(list_organizers))
        .route(
            "/api/admin/bank-accounts",
            get(admin_list_bank_accounts).post(admin_add_bank_account),
        )
        .route("/api/admin/financials", get(financials))
        .route("/api/admin/organizers/finance", get(organizers_finance))
        .layer(cors)
        .with_state(Arc::new(AppState {
            db_client,
            uploads_dir: config.uploads.dir,
            jwt_expiration_time: config.jwt.expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
            jwt_encoding_key: EncodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

fn internal_error(e: &dyn Error) -> Response {
    tracing::error!("request failed: {e}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

fn is_unique_violation(e: &db::Error) -> bool {
    e.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

#[derive(Deserialize)]
struct SignupInput {
    name: String,
    email: String,
    password: String,
}

async fn signup(
    State(state): State<SharedAppState>,
    Json(SignupInput {
        name,
        email,
        password,
    }): Json<SignupInput>,
) -> Result<Json<api::User>, SignupError> {
    use SignupError as E;

    if name.trim().is_empty() || email.trim().is_empty() || password.is_empty()
    {
        return Err(E::MissingFields);
    }

    let user = db::User {
        id: db::user::Id::new(),
        name,
        email,
        role: db::user::Role::User,
        password_hash: db::user::PasswordHash::new(&password),
        created_at: OffsetDateTime::now_utc(),
    };

    state.db_client.write_user(&user).await.map_err(|e| {
        if is_unique_violation(&e) {
            E::EmailTaken
        } else {
            E::DbError(e)
        }
    })?;

    Ok(Json(api::User::from(&user)))
}

#[derive(Debug, From)]
pub enum SignupError {
    #[from]
    DbError(db::Error),
    EmailTaken,
    MissingFields,
}

impl IntoResponse for SignupError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::EmailTaken => {
                error_response(StatusCode::CONFLICT, "Email already in use")
            }
            Self::MissingFields => {
                error_response(StatusCode::BAD_REQUEST, "Missing fields")
            }
        }
    }
}

#[derive(Deserialize)]
struct AuthInput {
    email: String,
    password: String,
}

async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { email, password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    // An unknown email and a wrong password are deliberately
    // indistinguishable here.
    let user = state
        .db_client
        .get_user_by_email(&email)
        .await?
        .filter(|u| u.password_hash.verify(&password))
        .ok_or(E::WrongEmailOrPassword)?;

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            user_id: user.id,
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    DbError(db::Error),
    InvalidToken,
    WrongEmailOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::InvalidToken => {
                error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            Self::WrongEmailOrPassword => error_response(
                StatusCode::FORBIDDEN,
                "Invalid email or password",
            ),
        }
    }
}

async fn get_user(Actor(my): Actor) -> Json<api::User> {
    Json(api::User::from(&my))
}

#[derive(Deserialize)]
struct PageInput {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_page_limit")]
    limit: usize,
}

fn default_page_limit() -> usize {
    50
}

async fn list_events(
    State(state): State<SharedAppState>,
    Query(PageInput { offset, limit }): Query<PageInput>,
) -> Result<Json<api::event::List>, ListEventsError> {
    let page_fut = state.db_client.get_published_events_page(offset, limit);
    let total_count_fut = state.db_client.get_published_events_count();
    let (page, total_count) = tokio::try_join!(page_fut, total_count_fut)?;

    let events = embed_organizers(&state, page).await?;

    Ok(Json(api::event::List {
        events,
        total_count,
    }))
}

#[derive(Debug, From)]
pub enum ListEventsError {
    #[from]
    DbError(db::Error),
    Forbidden,
    OrganizerNotFound(api::user::Id),
}

impl IntoResponse for ListEventsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
            Self::OrganizerNotFound(_) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ),
        }
    }
}

/// Batch-loads the owning organizers of `events` and produces API
/// representations.
async fn embed_organizers(
    state: &AppState,
    events: Vec<db::Event>,
) -> Result<Vec<api::Event>, ListEventsError> {
    let organizer_ids = events
        .iter()
        .map(|event| event.organizer)
        .unique()
        .collect::<Vec<_>>();
    let organizers = state.db_client.get_users_by_ids(&organizer_ids).await?;

    events
        .into_iter()
        .map(|event| {
            let organizer = organizers
                .get(&event.organizer)
                .ok_or(ListEventsError::OrganizerNotFound(event.organizer))?;
            Ok(event_to_api(&event, organizer))
        })
        .collect()
}

fn event_to_api(event: &db::Event, organizer: &db::User) -> api::Event {
    api::Event {
        id: event.id,
        title: event.title.clone(),
        slug: event.slug.clone(),
        description: event.description.clone(),
        start_date: event.start_date,
        end_date: event.end_date,
        location: event.location.clone(),
        cover_image_url: event.cover_image_url.clone(),
        status: event.status,
        organizer: api::user::Summary::from(organizer),
        bank_account_id: event.bank_account,
    }
}

async fn get_event(
    State(state): State<SharedAppState>,
    Path(slug): Path<String>,
) -> Result<Json<api::event::Detail>, GetEventError> {
    use GetEventError as E;

    let event = state
        .db_client
        .get_event_by_slug(&slug)
        .await?
        .filter(|event| event.status == db::event::Status::Published)
        .ok_or(E::EventNotFound)?;

    let organizer_fut = state.db_client.get_user_by_id(event.organizer);
    let ticket_types_fut = state.db_client.get_ticket_types_by_event(event.id);
    let bank_account_fut =
        state.db_client.get_bank_account_by_id(event.bank_account);
    let (organizer, ticket_types, bank_account) =
        tokio::try_join!(organizer_fut, ticket_types_fut, bank_account_fut)?;
    let organizer = organizer.ok_or(E::OrganizerNotFound)?;
    let bank_account = bank_account.ok_or(E::BankAccountNotFound)?;

    Ok(Json(api::event::Detail {
        event: event_to_api(&event, &organizer),
        ticket_types: ticket_types.iter().map(api::TicketType::from).collect(),
        bank_account: api::BankAccount::from(&bank_account),
    }))
}

#[derive(Debug, From)]
pub enum GetEventError {
    #[from]
    DbError(db::Error),
    BankAccountNotFound,
    EventNotFound,
    OrganizerNotFound,
}

impl IntoResponse for GetEventError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::EventNotFound => {
                error_response(StatusCode::NOT_FOUND, "Event not found")
            }
            Self::BankAccountNotFound | Self::OrganizerNotFound => {
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                )
            }
        }
    }
}

async fn reserve(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    mut form: Multipart,
) -> Result<Json<api::payment::Payment>, ReserveError> {
    use ReserveError as E;

    let mut ticket_type_id = None;
    let mut slug = None;
    let mut receipt = None;

    while let Some(field) =
        form.next_field().await.map_err(|_| E::MissingFields)?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("ticketTypeId") => {
                let text = field.text().await.map_err(|_| E::MissingFields)?;
                ticket_type_id = Some(
                    text.parse::<db::ticket_type::Id>()
                        .map_err(|_| E::UnknownTicketType)?,
                );
            }
            Some("slug") => {
                slug = Some(field.text().await.map_err(|_| E::MissingFields)?);
            }
            Some("screenshot") => {
                let file_name =
                    field.file_name().unwrap_or("screenshot").to_owned();
                let data = field.bytes().await.map_err(|_| E::MissingFields)?;
                receipt = Some((file_name, data));
            }
            _ => {}
        }
    }

    let (Some(ticket_type_id), Some(slug), Some((file_name, data))) =
        (ticket_type_id, slug, receipt)
    else {
        return Err(E::MissingFields);
    };

    let ticket_type = state
        .db_client
        .get_ticket_type_by_id(ticket_type_id)
        .await?
        .ok_or(E::UnknownTicketType)?;
    let event = state
        .db_client
        .get_event_by_slug(&slug)
        .await?
        .ok_or(E::EventNotFound)?;
    if ticket_type.event != event.id {
        return Err(E::TicketTypeMismatch);
    }

    let file_name = receipt_file_name(&file_name);
    fs::write(state.uploads_dir.join(&file_name), &data)
        .await
        .map_err(E::UploadFailed)?;

    let payment = db::Payment {
        id: db::payment::Id::new(),
        user: my.id,
        event: event.id,
        ticket_type: ticket_type.id,
        // Copied now, so later price edits never touch this payment.
        amount: ticket_type.price,
        currency: db::payment::DEFAULT_CURRENCY.to_string(),
        payment_method: db::payment::DEFAULT_METHOD.to_string(),
        receipt_image_url: format!("/uploads/{file_name}"),
        status: db::payment::Status::Pending,
        reviewed_by: None,
        reviewed_at: None,
        created_at: OffsetDateTime::now_utc(),
    };
    state.db_client.write_payment(&payment).await?;

    Ok(Json(payment_to_api(&payment, &my, &event, &ticket_type)))
}

/// Collision-resistant name for a stored receipt: timestamp, random token
/// and the sanitized original name.
fn receipt_file_name(original: &str) -> String {
    let stamp = OffsetDateTime::now_utc().unix_timestamp();
    let token = Uuid::new_v4().simple();
    let original = original
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect::<String>();
    format!("{stamp}-{token}-{original}")
}

#[derive(Debug, From)]
pub enum ReserveError {
    #[from]
    DbError(db::Error),
    EventNotFound,
    MissingFields,
    TicketTypeMismatch,
    UnknownTicketType,
    UploadFailed(std::io::Error),
}

impl IntoResponse for ReserveError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::UploadFailed(e) => internal_error(&e),
            Self::EventNotFound => {
                error_response(StatusCode::NOT_FOUND, "Event not found")
            }
            Self::MissingFields => {
                error_response(StatusCode::BAD_REQUEST, "Missing fields")
            }
            Self::TicketTypeMismatch | Self::UnknownTicketType => {
                error_response(StatusCode::BAD_REQUEST, "Invalid ticket type")
            }
        }
    }
}

fn payment_to_api(
    payment: &db::Payment,
    buyer: &db::User,
    event: &db::Event,
    ticket_type: &db::TicketType,
) -> api::payment::Payment {
    api::payment::Payment {
        id: payment.id,
        amount: payment.amount,
        currency: payment.currency.clone(),
        status: payment.status,
        receipt_image_url: payment.receipt_image_url.clone(),
        created_at: payment.created_at,
        reviewed_at: payment.reviewed_at,
        user: api::User::from(buyer),
        event: api::event::Summary::from(event),
        ticket_type: api::TicketType::from(ticket_type),
    }
}

async fn my_tickets(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<api::ticket::Mine>, MyTicketsError> {
    use MyTicketsError as E;

    let tickets_fut = state.db_client.get_tickets_by_user(my.id);
    let pending_fut = state.db_client.get_pending_payments_by_user(my.id);
    let (tickets, pending) = tokio::try_join!(tickets_fut, pending_fut)?;

    let event_ids = tickets
        .iter()
        .map(|ticket| ticket.event)
        .chain(pending.iter().map(|payment| payment.event))
        .unique()
        .collect::<Vec<_>>();
    let ticket_type_ids = tickets
        .iter()
        .map(|ticket| ticket.ticket_type)
        .chain(pending.iter().map(|payment| payment.ticket_type))
        .unique()
        .collect::<Vec<_>>();
    let events_fut = state.db_client.get_events_by_ids(&event_ids);
    let ticket_types_fut =
        state.db_client.get_ticket_types_by_ids(&ticket_type_ids);
    let (events, ticket_types) =
        tokio::try_join!(events_fut, ticket_types_fut)?;

    let tickets = tickets
        .into_iter()
        .map(|ticket| {
            let event = events
                .get(&ticket.event)
                .ok_or(E::EventNotFound(ticket.event))?;
            let ticket_type = ticket_types
                .get(&ticket.ticket_type)
                .ok_or(E::TicketTypeNotFound(ticket.ticket_type))?;
            Ok::<_, E>(api::Ticket {
                id: ticket.id,
                status: ticket.status,
                created_at: ticket.created_at,
                event: api::event::Summary::from(event),
                ticket_type_name: ticket_type.name.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pending_reservations = pending
        .into_iter()
        .map(|payment| {
            let event = events
                .get(&payment.event)
                .ok_or(E::EventNotFound(payment.event))?;
            let ticket_type = ticket_types
                .get(&payment.ticket_type)
                .ok_or(E::TicketTypeNotFound(payment.ticket_type))?;
            Ok::<_, E>(api::ticket::PendingReservation {
                payment_id: payment.id,
                amount: payment.amount,
                created_at: payment.created_at,
                event: api::event::Summary::from(event),
                ticket_type_name: ticket_type.name.clone(),
                receipt_image_url: payment.receipt_image_url,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(api::ticket::Mine {
        tickets,
        pending_reservations,
    }))
}

#[derive(Debug, From)]
pub enum MyTicketsError {
    #[from]
    DbError(db::Error),
    EventNotFound(api::event::Id),
    TicketTypeNotFound(api::ticket_type::Id),
}

impl IntoResponse for MyTicketsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::EventNotFound(_) | Self::TicketTypeNotFound(_) => {
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                )
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveEventInput {
    title: String,
    slug: String,
    #[serde(default)]
    description: String,
    #[serde(with = "time::serde::rfc3339")]
    start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end_date: OffsetDateTime,
    location: String,
    #[serde(default)]
    cover_image_url: Option<String>,
    bank_account_id: api::bank_account::Id,
}

impl SaveEventInput {
    fn validate(&self) -> Result<(), SaveEventError> {
        if self.title.trim().is_empty()
            || self.slug.trim().is_empty()
            || self.location.trim().is_empty()
        {
            return Err(SaveEventError::MissingFields);
        }
        Ok(())
    }
}

async fn organizer_add_event(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Json(input): Json<SaveEventInput>,
) -> Result<Json<api::Event>, SaveEventError> {
    use SaveEventError as E;

    if !my.role.is_staff() {
        return Err(E::Forbidden);
    }
    input.validate()?;

    let bank_account = state
        .db_client
        .get_bank_account_by_id(input.bank_account_id)
        .await?
        .ok_or(E::UnknownBankAccount)?;
    if bank_account.organizer != my.id {
        return Err(E::ForeignBankAccount);
    }

    let event = db::Event {
        id: db::event::Id::new(),
        title: input.title,
        slug: input.slug,
        description: input.description,
        start_date: input.start_date,
        end_date: input.end_date,
        location: input.location,
        cover_image_url: input.cover_image_url,
        organizer: my.id,
        bank_account: input.bank_account_id,
        status: db::event::Status::Pending,
        created_at: OffsetDateTime::now_utc(),
    };
    write_event_checked(&state, &event).await?;

    Ok(Json(event_to_api(&event, &my)))
}

/// Persists an event, translating a slug collision into its own error.
async fn write_event_checked(
    state: &AppState,
    event: &db::Event,
) -> Result<(), SaveEventError> {
    state.db_client.write_event(event).await.map_err(|e| {
        if is_unique_violation(&e) {
            SaveEventError::SlugTaken
        } else {
            SaveEventError::DbError(e)
        }
    })
}

#[derive(Debug, From)]
pub enum SaveEventError {
    #[from]
    DbError(db::Error),
    EventNotFound,
    Forbidden,
    ForeignBankAccount,
    MissingFields,
    OrganizerNotFound,
    SlugTaken,
    UnknownBankAccount,
    UnknownOrganizer,
}

impl IntoResponse for SaveEventError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::EventNotFound => {
                error_response(StatusCode::NOT_FOUND, "Event not found")
            }
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
            Self::ForeignBankAccount | Self::UnknownBankAccount => {
                error_response(StatusCode::BAD_REQUEST, "Invalid bank account")
            }
            Self::MissingFields => {
                error_response(StatusCode::BAD_REQUEST, "Missing fields")
            }
            Self::OrganizerNotFound => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ),
            Self::SlugTaken => {
                error_response(StatusCode::CONFLICT, "Slug already in use")
            }
            Self::UnknownOrganizer => {
                error_response(StatusCode::BAD_REQUEST, "Invalid organizer")
            }
        }
    }
}

async fn organizer_list_events(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<api::event::List>, ListEventsError> {
    if !my.role.is_staff() {
        return Err(ListEventsError::Forbidden);
    }

    let events = if my.role.is_admin() {
        state.db_client.get_events().await?
    } else {
        state.db_client.get_events_by_organizer(my.id).await?
    };
    let total_count = events.len();
    let events = embed_organizers(&state, events).await?;

    Ok(Json(api::event::List {
        events,
        total_count,
    }))
}

async fn staff_get_event(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::event::Id>,
) -> Result<Json<api::Event>, SaveEventError> {
    use SaveEventError as E;

    if !my.role.is_staff() {
        return Err(E::Forbidden);
    }

    let event = state
        .db_client
        .get_event_by_id(id)
        .await?
        // Non-owners get the same 404 as a missing id.
        .filter(|event| my.role.is_admin() || event.organizer == my.id)
        .ok_or(E::EventNotFound)?;

    let organizer = state
        .db_client
        .get_user_by_id(event.organizer)
        .await?
        .ok_or(E::OrganizerNotFound)?;

    Ok(Json(event_to_api(&event, &organizer)))
}

async fn staff_edit_event(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::event::Id>,
    Json(input): Json<SaveEventInput>,
) -> Result<Json<api::Event>, SaveEventError> {
    use SaveEventError as E;

    if !my.role.is_staff() {
        return Err(E::Forbidden);
    }
    input.validate()?;

    let mut event = state
        .db_client
        .get_event_by_id(id)
        .await?
        .filter(|event| my.role.is_admin() || event.organizer == my.id)
        .ok_or(E::EventNotFound)?;

    let bank_account = state
        .db_client
        .get_bank_account_by_id(input.bank_account_id)
        .await?
        .ok_or(E::UnknownBankAccount)?;
    if bank_account.organizer != event.organizer {
        return Err(E::ForeignBankAccount);
    }

    event.title = input.title;
    event.slug = input.slug;
    event.description = input.description;
    event.start_date = input.start_date;
    event.end_date = input.end_date;
    event.location = input.location;
    event.cover_image_url = input.cover_image_url;
    event.bank_account = input.bank_account_id;
    write_event_checked(&state, &event).await?;

    let organizer = state
        .db_client
        .get_user_by_id(event.organizer)
        .await?
        .ok_or(E::OrganizerNotFound)?;

    Ok(Json(event_to_api(&event, &organizer)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTicketTypeInput {
    name: String,
    price: i64,
    quantity_total: usize,
}

async fn list_ticket_types(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::event::Id>,
) -> Result<Json<Vec<api::TicketType>>, TicketTypeError> {
    use TicketTypeError as E;

    if !my.role.is_staff() {
        return Err(E::Forbidden);
    }

    let event = state
        .db_client
        .get_event_by_id(id)
        .await?
        .filter(|event| my.role.is_admin() || event.organizer == my.id)
        .ok_or(E::EventNotFound)?;

    let ticket_types =
        state.db_client.get_ticket_types_by_event(event.id).await?;
    Ok(Json(
        ticket_types.iter().map(api::TicketType::from).collect(),
    ))
}

async fn add_ticket_type(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::event::Id>,
    Json(input): Json<AddTicketTypeInput>,
) -> Result<Json<api::TicketType>, TicketTypeError> {
    use TicketTypeError as E;

    if !my.role.is_staff() {
        return Err(E::Forbidden);
    }
    if input.name.trim().is_empty() || input.price < 0 {
        return Err(E::MissingFields);
    }

    let event = state
        .db_client
        .get_event_by_id(id)
        .await?
        .filter(|event| my.role.is_admin() || event.organizer == my.id)
        .ok_or(E::EventNotFound)?;

    let ticket_type = db::TicketType {
        id: db::ticket_type::Id::new(),
        event: event.id,
        name: input.name,
        price: input.price,
        quantity_total: input.quantity_total,
        quantity_sold: 0,
    };
    state.db_client.write_ticket_type(&ticket_type).await?;

    Ok(Json(api::TicketType::from(&ticket_type)))
}

#[derive(Debug, From)]
pub enum TicketTypeError {
    #[from]
    DbError(db::Error),
    EventNotFound,
    Forbidden,
    MissingFields,
}

impl IntoResponse for TicketTypeError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::EventNotFound => {
                error_response(StatusCode::NOT_FOUND, "Event not found")
            }
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
            Self::MissingFields => {
                error_response(StatusCode::BAD_REQUEST, "Missing fields")
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBankAccountInput {
    bank_name: String,
    account_number: String,
    account_holder: String,
    #[serde(default)]
    instructions: Option<String>,
}

impl AddBankAccountInput {
    fn validate(&self) -> Result<(), BankAccountError> {
        if self.bank_name.trim().is_empty()
            || self.account_number.trim().is_empty()
            || self.account_holder.trim().is_empty()
        {
            return Err(BankAccountError::MissingFields);
        }
        Ok(())
    }

    fn into_account(self, organizer: api::user::Id) -> db::BankAccount {
        db::BankAccount {
            id: db::bank_account::Id::new(),
            organizer,
            bank_name: self.bank_name,
            account_number: self.account_number,
            account_holder: self.account_holder,
            instructions: self.instructions,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

async fn organizer_list_bank_accounts(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<Vec<api::BankAccount>>, BankAccountError> {
    if !my.role.is_staff() {
        return Err(BankAccountError::Forbidden);
    }

    let accounts =
        state.db_client.get_bank_accounts_by_organizer(my.id).await?;
    Ok(Json(accounts.iter().map(api::BankAccount::from).collect()))
}

async fn organizer_add_bank_account(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Json(input): Json<AddBankAccountInput>,
) -> Result<Json<api::BankAccount>, BankAccountError> {
    if !my.role.is_staff() {
        return Err(BankAccountError::Forbidden);
    }
    input.validate()?;

    let account = input.into_account(my.id);
    state.db_client.write_bank_account(&account).await?;

    Ok(Json(api::BankAccount::from(&account)))
}

async fn admin_list_bank_accounts(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<Vec<api::BankAccount>>, BankAccountError> {
    if !my.role.is_admin() {
        return Err(BankAccountError::Forbidden);
    }

    let accounts = state.db_client.get_bank_accounts().await?;
    Ok(Json(accounts.iter().map(api::BankAccount::from).collect()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminAddBankAccountInput {
    organizer_id: api::user::Id,
    #[serde(flatten)]
    account: AddBankAccountInput,
}

async fn admin_add_bank_account(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Json(input): Json<AdminAddBankAccountInput>,
) -> Result<Json<api::BankAccount>, BankAccountError> {
    use BankAccountError as E;

    if !my.role.is_admin() {
        return Err(E::Forbidden);
    }
    input.account.validate()?;

    let organizer = state
        .db_client
        .get_user_by_id(input.organizer_id)
        .await?
        .ok_or(E::UnknownOrganizer)?;

    let account = input.account.into_account(organizer.id);
    state.db_client.write_bank_account(&account).await?;

    Ok(Json(api::BankAccount::from(&account)))
}

#[derive(Debug, From)]
pub enum BankAccountError {
    #[from]
    DbError(db::Error),
    Forbidden,
    MissingFields,
    UnknownOrganizer,
}

impl IntoResponse for BankAccountError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
            Self::MissingFields => {
                error_response(StatusCode::BAD_REQUEST, "Missing fields")
            }
            Self::UnknownOrganizer => {
                error_response(StatusCode::BAD_REQUEST, "Invalid organizer")
            }
        }
    }
}

async fn list_pending_payments(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Query(PageInput { offset, limit }): Query<PageInput>,
) -> Result<Json<api::payment::List>, ListPaymentsError> {
    if !my.role.is_staff() {
        return Err(ListPaymentsError::Forbidden);
    }

    // Admins review everything, organizers only their own events.
    let scope = if my.role.is_admin() { None } else { Some(my.id) };
    let page_fut =
        state.db_client.get_pending_payments_page(scope, offset, limit);
    let total_count_fut = state.db_client.get_pending_payments_count(scope);
    let (page, total_count) = tokio::try_join!(page_fut, total_count_fut)?;

    let payments = embed_payment_context(&state, page).await?;

    Ok(Json(api::payment::List {
        payments,
        total_count,
    }))
}

/// Batch-loads the buyers, events and ticket types referenced by
/// `payments` and produces API representations.
async fn embed_payment_context(
    state: &AppState,
    payments: Vec<db::Payment>,
) -> Result<Vec<api::payment::Payment>, ListPaymentsError> {
    use ListPaymentsError as E;

    let user_ids = payments
        .iter()
        .map(|payment| payment.user)
        .unique()
        .collect::<Vec<_>>();
    let event_ids = payments
        .iter()
        .map(|payment| payment.event)
        .unique()
        .collect::<Vec<_>>();
    let ticket_type_ids = payments
        .iter()
        .map(|payment| payment.ticket_type)
        .unique()
        .collect::<Vec<_>>();

    let users_fut = state.db_client.get_users_by_ids(&user_ids);
    let events_fut = state.db_client.get_events_by_ids(&event_ids);
    let ticket_types_fut =
        state.db_client.get_ticket_types_by_ids(&ticket_type_ids);
    let (users, events, ticket_types) =
        tokio::try_join!(users_fut, events_fut, ticket_types_fut)?;

    payments
        .into_iter()
        .map(|payment| {
            let buyer = users
                .get(&payment.user)
                .ok_or(E::UserNotFound(payment.user))?;
            let event = events
                .get(&payment.event)
                .ok_or(E::EventNotFound(payment.event))?;
            let ticket_type = ticket_types
                .get(&payment.ticket_type)
                .ok_or(E::TicketTypeNotFound(payment.ticket_type))?;
            Ok(payment_to_api(&payment, buyer, event, ticket_type))
        })
        .collect()
}

#[derive(Debug, From)]
pub enum ListPaymentsError {
    #[from]
    DbError(db::Error),
    EventNotFound(api::event::Id),
    Forbidden,
    TicketTypeNotFound(api::ticket_type::Id),
    UserNotFound(api::user::Id),
}

impl IntoResponse for ListPaymentsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
            Self::EventNotFound(_)
            | Self::TicketTypeNotFound(_)
            | Self::UserNotFound(_) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ),
        }
    }
}

async fn approve_payment(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::payment::Id>,
) -> Result<Json<api::payment::Review>, ReviewPaymentError> {
    use ReviewPaymentError as E;

    if !my.role.is_staff() {
        return Err(E::Forbidden);
    }

    let mut payment = state
        .db_client
        .get_payment_by_id(id)
        .await?
        .ok_or(E::PaymentNotFound)?;
    let event = state
        .db_client
        .get_event_by_id(payment.event)
        .await?
        .ok_or(E::EventNotFound)?;
    if !event.reviewable_by(&my) {
        return Err(E::Forbidden);
    }

    let reviewed_at = OffsetDateTime::now_utc();
    let ticket_id = db::ticket::Id::new();
    let approved = state
        .db_client
        .approve_payment(payment.id, my.id, reviewed_at, ticket_id)
        .await?;
    if !approved {
        // Lost the race, or the payment was already reviewed.
        return Err(E::AlreadyReviewed);
    }

    payment.status = db::payment::Status::Approved;
    payment.reviewed_by = Some(my.id);
    payment.reviewed_at = Some(reviewed_at);

    let buyer_fut = state.db_client.get_user_by_id(payment.user);
    let ticket_type_fut =
        state.db_client.get_ticket_type_by_id(payment.ticket_type);
    let (buyer, ticket_type) = tokio::try_join!(buyer_fut, ticket_type_fut)?;
    let buyer = buyer.ok_or(E::UserNotFound)?;
    let ticket_type = ticket_type.ok_or(E::TicketTypeNotFound)?;

    Ok(Json(api::payment::Review {
        payment: payment_to_api(&payment, &buyer, &event, &ticket_type),
        ticket: Some(api::Ticket {
            id: ticket_id,
            status: db::ticket::Status::Valid,
            created_at: reviewed_at,
            event: api::event::Summary::from(&event),
            ticket_type_name: ticket_type.name.clone(),
        }),
    }))
}

async fn reject_payment(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::payment::Id>,
) -> Result<Json<api::payment::Review>, ReviewPaymentError> {
    use ReviewPaymentError as E;

    if !my.role.is_staff() {
        return Err(E::Forbidden);
    }

    let mut payment = state
        .db_client
        .get_payment_by_id(id)
        .await?
        .ok_or(E::PaymentNotFound)?;
    let event = state
        .db_client
        .get_event_by_id(payment.event)
        .await?
        .ok_or(E::EventNotFound)?;
    if !event.reviewable_by(&my) {
        return Err(E::Forbidden);
    }

    let reviewed_at = OffsetDateTime::now_utc();
    let rejected = state
        .db_client
        .reject_payment(payment.id, my.id, reviewed_at)
        .await?;
    if !rejected {
        return Err(E::AlreadyReviewed);
    }

    payment.status = db::payment::Status::Rejected;
    payment.reviewed_by = Some(my.id);
    payment.reviewed_at = Some(reviewed_at);

    let buyer_fut = state.db_client.get_user_by_id(payment.user);
    let ticket_type_fut =
        state.db_client.get_ticket_type_by_id(payment.ticket_type);
    let (buyer, ticket_type) = tokio::try_join!(buyer_fut, ticket_type_fut)?;
    let buyer = buyer.ok_or(E::UserNotFound)?;
    let ticket_type = ticket_type.ok_or(E::TicketTypeNotFound)?;

    Ok(Json(api::payment::Review {
        payment: payment_to_api(&payment, &buyer, &event, &ticket_type),
        ticket: None,
    }))
}

#[derive(Debug, From)]
pub enum ReviewPaymentError {
    #[from]
    DbError(db::Error),
    AlreadyReviewed,
    EventNotFound,
    Forbidden,
    PaymentNotFound,
    TicketTypeNotFound,
    UserNotFound,
}

impl IntoResponse for ReviewPaymentError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::AlreadyReviewed => error_response(
                StatusCode::CONFLICT,
                "Payment already reviewed",
            ),
            Self::EventNotFound => {
                error_response(StatusCode::NOT_FOUND, "Event not found")
            }
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
            Self::PaymentNotFound => {
                error_response(StatusCode::NOT_FOUND, "Payment not found")
            }
            Self::TicketTypeNotFound | Self::UserNotFound => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminAddEventInput {
    organizer_id: api::user::Id,
    #[serde(flatten)]
    event: SaveEventInput,
}

async fn admin_add_event(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Json(input): Json<AdminAddEventInput>,
) -> Result<Json<api::Event>, SaveEventError> {
    use SaveEventError as E;

    if !my.role.is_admin() {
        return Err(E::Forbidden);
    }
    input.event.validate()?;

    let organizer = state
        .db_client
        .get_user_by_id(input.organizer_id)
        .await?
        .ok_or(E::UnknownOrganizer)?;
    let bank_account = state
        .db_client
        .get_bank_account_by_id(input.event.bank_account_id)
        .await?
        .ok_or(E::UnknownBankAccount)?;
    if bank_account.organizer != organizer.id {
        return Err(E::ForeignBankAccount);
    }

    let event = db::Event {
        id: db::event::Id::new(),
        title: input.event.title,
        slug: input.event.slug,
        description: input.event.description,
        start_date: input.event.start_date,
        end_date: input.event.end_date,
        location: input.event.location,
        cover_image_url: input.event.cover_image_url,
        organizer: organizer.id,
        bank_account: input.event.bank_account_id,
        status: db::event::Status::Draft,
        created_at: OffsetDateTime::now_utc(),
    };
    write_event_checked(&state, &event).await?;

    Ok(Json(event_to_api(&event, &organizer)))
}

async fn admin_list_events(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<api::event::List>, ListEventsError> {
    if !my.role.is_admin() {
        return Err(ListEventsError::Forbidden);
    }

    let events = state.db_client.get_events().await?;
    let total_count = events.len();
    let events = embed_organizers(&state, events).await?;

    Ok(Json(api::event::List {
        events,
        total_count,
    }))
}

async fn toggle_publish(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::event::Id>,
) -> Result<Json<api::Event>, SaveEventError> {
    use SaveEventError as E;

    if !my.role.is_admin() {
        return Err(E::Forbidden);
    }

    let mut event = state
        .db_client
        .get_event_by_id(id)
        .await?
        .ok_or(E::EventNotFound)?;
    event.status = event.status.toggled();
    state.db_client.write_event(&event).await?;

    let organizer = state
        .db_client
        .get_user_by_id(event.organizer)
        .await?
        .ok_or(E::OrganizerNotFound)?;

    Ok(Json(event_to_api(&event, &organizer)))
}

async fn list_users(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Query(PageInput { offset, limit }): Query<PageInput>,
) -> Result<Json<api::user::List>, ListOrganizersError> {
    if !my.role.is_admin() {
        return Err(ListOrganizersError::Forbidden);
    }

    let page_fut = state.db_client.get_users_page(offset, limit);
    let total_count_fut = state.db_client.get_users_count();
    let (page, total_count) = tokio::try_join!(page_fut, total_count_fut)?;

    Ok(Json(api::user::List {
        users: page.iter().map(api::User::from).collect(),
        total_count,
    }))
}

#[derive(Deserialize)]
struct SetRoleInput {
    role: api::user::Role,
}

async fn set_user_role(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
    Path(id): Path<api::user::Id>,
    Json(SetRoleInput { role }): Json<SetRoleInput>,
) -> Result<Json<api::User>, SetRoleError> {
    use SetRoleError as E;

    if !my.role.is_admin() {
        return Err(E::Forbidden);
    }

    if !state.db_client.set_user_role(id, role).await? {
        return Err(E::UserNotFound);
    }
    let user = state
        .db_client
        .get_user_by_id(id)
        .await?
        .ok_or(E::UserNotFound)?;

    Ok(Json(api::User::from(&user)))
}

#[derive(Debug, From)]
pub enum SetRoleError {
    #[from]
    DbError(db::Error),
    Forbidden,
    UserNotFound,
}

impl IntoResponse for SetRoleError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
            Self::UserNotFound => {
                error_response(StatusCode::NOT_FOUND, "User not found")
            }
        }
    }
}

async fn list_organizers(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<Vec<api::User>>, ListOrganizersError> {
    if !my.role.is_admin() {
        return Err(ListOrganizersError::Forbidden);
    }

    let organizers = state.db_client.get_organizers().await?;
    Ok(Json(organizers.iter().map(api::User::from).collect()))
}

#[derive(Debug, From)]
pub enum ListOrganizersError {
    #[from]
    DbError(db::Error),
    Forbidden,
}

impl IntoResponse for ListOrganizersError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal_error(&e),
            Self::Forbidden => {
                error_response(StatusCode::FORBIDDEN, "Forbidden")
            }
        }
    }
}

const RECENT_PAYMENTS_LIMIT: usize = 50;

async fn financials(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<api::report::Financials>, ListPaymentsError> {
    use ListPaymentsError as E;

    if !my.role.is_admin() {
        return Err(E::Forbidden);
    }

    let amounts_fut = state.db_client.get_approved_amounts();
    let recent_fut = state
        .db_client
        .get_recent_approved_payments(RECENT_PAYMENTS_LIMIT);
    let (amounts, recent) = tokio::try_join!(amounts_fut, recent_fut)?;

    let summary = fees::Summary::from_amounts(amounts);
    let recent_payments = embed_payment_context(&state, recent)
        .await?
        .into_iter()
        .map(|payment| {
            let fee = fees::service_fee(payment.amount);
            let vat = fees::vat(fee);
            api::report::RecentPayment {
                id: payment.id,
                amount: payment.amount,
                service_fee: fee,
                vat,
                profit: fee - vat,
                created_at: payment.created_at,
                user: payment.user,
                event: payment.event,
                ticket_type_name: payment.ticket_type.name,
            }
        })
        .collect();

    Ok(Json(api::report::Financials {
        revenue: summary.revenue,
        service_fee: summary.service_fee,
        vat: summary.vat,
        admin_profit: summary.admin_profit,
        recent_payments,
    }))
}

async fn organizers_finance(
    State(state): State<SharedAppState>,
    Actor(my): Actor,
) -> Result<Json<Vec<api::report::OrganizerFinance>>, ListOrganizersError> {
    if !my.role.is_admin() {
        return Err(ListOrganizersError::Forbidden);
    }

    let state = &state;
    let organizers = state.db_client.get_organizers().await?;
    let rows = try_join_all(organizers.iter().map(|organizer| async move {
        let tickets_fut =
            state.db_client.get_tickets_count_by_organizer(organizer.id);
        let revenue_fut =
            state.db_client.get_approved_total_by_organizer(organizer.id);
        let (tickets_sold, revenue) =
            tokio::try_join!(tickets_fut, revenue_fut)?;
        Ok::<_, db::Error>(api::report::OrganizerFinance {
            organizer: api::User::from(organizer),
            tickets_sold,
            revenue,
        })
    }))
    .await?;

    Ok(Json(rows))
}

type SharedAppState = Arc<AppState>;

struct AppState {
    db_client: db::Client,

    uploads_dir: PathBuf,

    jwt_expiration_time: Duration,

    jwt_decoding_key: DecodingKey,

    jwt_encoding_key: EncodingKey,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    user_id: api::user::Id,
    exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}

/// The authenticated user behind a request.
///
/// Always loaded from the database, never trusted from the token, so a role
/// change by an admin takes effect on the target's very next request.
pub struct Actor(db::User);

#[async_trait]
impl FromRequestParts<SharedAppState> for Actor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = AuthClaims::from_request_parts(parts, state).await?;
        state
            .db_client
            .get_user_by_id(claims.user_id)
            .await?
            .map(Self)
            .ok_or(AuthError::InvalidToken)
    }
}
