pub mod bank_account;
pub mod event;
pub mod payment;
pub mod report;
pub mod ticket;
pub mod ticket_type;
pub mod user;

pub use self::{
    bank_account::BankAccount, event::Event, payment::Payment,
    ticket::Ticket, ticket_type::TicketType, user::User,
};
