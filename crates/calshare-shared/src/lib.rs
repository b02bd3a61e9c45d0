//! # calshare-shared
//!
//! Domain models and wire protocol shared between the calshare server and
//! its clients: the [`Event`] / [`User`] / [`AuthToken`] structs, the JSON
//! message envelope, salted password hashing, and field validation rules.

pub mod error;
pub mod models;
pub mod password;
pub mod protocol;
pub mod validate;

pub use error::ProtocolError;
pub use models::{AuthToken, Event, User};
pub use protocol::Envelope;
