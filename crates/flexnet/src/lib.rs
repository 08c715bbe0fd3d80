//! FlexNet license-manager client, assembled from its constituent crates the way
//! the `ironrdp` meta-crate re-exports `ironrdp-pdu`, `ironrdp-connector`, and friends.

pub use flexnet_client::{
    Client, ClientError, ClientErrorKind, ClientIdentity, ClientResult, Config, Dialect, License, LicenseSet,
    LicenseStatus, Server, UsageRecord, Vendor,
};
pub use flexnet_error::Error;
pub use flexnet_license_file::{ParseError, ParsedLicenseFile, RawLicense, ServerEntry, VendorEntry};
pub use flexnet_proto::{Frame, Message, MessageType};
