//! Conversation state machine (C4) and domain model (C5) for the FlexNet license
//! protocol: dial a manager, discover its vendors, and query each one's features,
//! catalog, and live usage.

mod client;
mod domain;
mod error;
mod identity;
mod status;

pub use client::{Client, Dialect};
pub use domain::{License, LicenseSet, LicenseStatus, Server, UsageRecord, Vendor};
pub use error::{ClientError, ClientErrorExt, ClientErrorKind, ClientResult};
pub use identity::{ClientIdentity, Config};
pub use status::StatusQuery;
