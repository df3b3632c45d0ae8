//! Mail gateway — POP3 retrieval, SMTP submission, and periodic mailbox fetch.

pub mod config;
pub mod error;
pub mod gateway;
pub mod message;
pub mod pop3;
pub mod scheduler;
pub mod smtp;
pub mod store;
pub mod transport;

pub use error::{Error, Result};
pub use gateway::MailGateway;
