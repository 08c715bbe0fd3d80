use std::collections::BTreeMap;

/// A `SERVER` line: the license-manager host, its hostid, and an optional port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerEntry {
    pub host: String,
    /// Composite hostid: repeated `= <token>` suffixes are concatenated onto the base hostid.
    pub hostid: String,
    pub port: Option<u16>,
}

/// A `VENDOR`/`DAEMON` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorEntry {
    pub name: String,
    pub daemon_path: Option<String>,
}

/// One `INCREMENT`/`FEATURE` line, parsed but not yet reconciled against a vendor's
/// wire-borne catalog (that happens in `flexnet-client`'s conversation state machine).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLicense {
    pub feature: String,
    pub vendor: String,
    pub version: String,
    pub expdate: String,
    /// `0` means `uncounted`.
    pub quantity: u32,
    /// Lowercased `KEY=VALUE` trailing pairs, de-quoted.
    pub attrs: BTreeMap<String, String>,
    /// Trailing tokens that did not form a `KEY=VALUE` pair.
    pub others: Vec<String>,
}

impl RawLicense {
    pub fn notice(&self) -> Option<&str> {
        self.attrs.get("notice").map(String::as_str)
    }

    pub fn issued(&self) -> Option<&str> {
        self.attrs.get("issued").map(String::as_str)
    }

    pub fn start(&self) -> Option<&str> {
        self.attrs.get("start").map(String::as_str)
    }

    pub fn sign(&self) -> Option<&str> {
        self.attrs.get("sign").map(String::as_str)
    }

    /// The identifier used to query status: `sign`, falling back to the first free-form token.
    pub fn status_identifier(&self) -> Option<&str> {
        self.sign().or_else(|| self.others.first().map(String::as_str))
    }
}

/// The result of parsing one FlexNet license-file text blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedLicenseFile {
    pub use_server: bool,
    pub servers: Vec<ServerEntry>,
    pub vendors: Vec<VendorEntry>,
    pub licenses: Vec<RawLicense>,
}
