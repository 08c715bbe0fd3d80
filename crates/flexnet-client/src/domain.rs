//! Typed view of a license manager's estate: servers, vendors, the licenses each
//! vendor serves, and their live usage. Built up by the conversation state machine
//! in [`crate::client`] from the wire types decoded by `flexnet-proto` and the
//! grammar parsed by `flexnet-license-file`.

use std::fmt;

use flexnet_license_file::RawLicense;
pub use flexnet_proto::UsageRecord;

/// One license manager host, after the `HELLO` handshake and `dlist`/`getpaths` queries.
#[derive(Debug, Clone)]
pub struct Server {
    pub hostname: String,
    pub port: u16,
    pub daemon: String,
    pub version: (u8, u8),
    pub license_file_path: Option<String>,
    /// Raw text of the manager's license file, fetched by the empty-command `REQ`
    /// when [`crate::identity::Config::fetch_license_file_text`] is set.
    pub license_file_text: Option<String>,
    pub vendors: Vec<Vendor>,
}

/// One vendor daemon, reached at its own host/port after a `STUBR` redirect.
#[derive(Debug, Clone)]
pub struct Vendor {
    pub name: String,
    pub hostname: String,
    pub port: u32,
    /// Feature names reported by the vendor's own `STUB`/legacy feature query.
    pub features: Vec<String>,
    /// License sets decoded from the vendor's `LICSET`/`STUB2` catalog. MODERN dialect only.
    pub license_sets: Vec<LicenseSet>,
    /// Member licenses pulled from the manager's license-file text whose `vendor` field
    /// names this vendor, each with its own status query result folded in.
    pub licenses: Vec<License>,
}

/// A `LICSET` catalog entry: a named bundle the vendor groups member licenses under.
#[derive(Debug, Clone)]
pub struct LicenseSet {
    pub fid: String,
    pub sig: String,
    pub names: String,
    pub date1: String,
    pub date2: String,
    pub url: String,
    pub licenses: Vec<License>,
    /// Set when this set's embedded license-file text failed to parse; `licenses`
    /// is empty in that case but the rest of the vendor sweep still proceeds.
    pub parse_error: Option<String>,
}

impl fmt::Display for LicenseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<15}: {}", "fid", self.fid)?;
        writeln!(f, "{:<15}: {}", "sig", self.sig)?;
        writeln!(f, "{:<15}: {}", "names", self.names)?;
        writeln!(f, "{:<15}: {}", "date1", self.date1)?;
        writeln!(f, "{:<15}: {}", "date2", self.date2)?;
        write!(f, "{:<15}: {}", "url", self.url)
    }
}

/// Live usage counters for one license, drained from a `REQLIC`/`REQLIC1` status query.
#[derive(Debug, Clone)]
pub struct LicenseStatus {
    pub used: u32,
    pub total: u32,
    /// Seconds since the Unix epoch, as reported by the vendor daemon.
    pub timestamp: u32,
    pub usage: Vec<UsageRecord>,
}

/// One `INCREMENT`/`FEATURE` entry, reconciled with its live status when one could be
/// queried (a `sign` or fallback free-form identifier was present).
#[derive(Debug, Clone)]
pub struct License {
    pub feature: String,
    pub vendor: String,
    pub version: String,
    pub expiration: String,
    pub quantity: u32,
    pub notice: Option<String>,
    pub issued: Option<String>,
    pub start: Option<String>,
    pub sign: Option<String>,
    pub others: Vec<String>,
    /// `None` when no status identifier was available and the query was skipped.
    /// `Some(Err(_))` records a per-license query failure without aborting the sweep.
    pub status: Option<Result<LicenseStatus, String>>,
}

impl License {
    pub fn from_raw(raw: &RawLicense) -> Self {
        Self {
            feature: raw.feature.clone(),
            vendor: raw.vendor.clone(),
            version: raw.version.clone(),
            expiration: raw.expdate.clone(),
            quantity: raw.quantity,
            notice: raw.notice().map(str::to_owned),
            issued: raw.issued().map(str::to_owned),
            start: raw.start().map(str::to_owned),
            sign: raw.sign().map(str::to_owned),
            others: raw.others.clone(),
            status: None,
        }
    }

    /// The identifier a status query is keyed on: `sign`, falling back to the first
    /// free-form trailing token. `None` means the license cannot be queried.
    pub fn status_identifier(&self) -> Option<&str> {
        self.sign.as_deref().or_else(|| self.others.first().map(String::as_str))
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<15}: {}", "feature", self.feature)?;
        writeln!(f, "{:<15}: {}", "vendor", self.vendor)?;
        writeln!(f, "{:<15}: {}", "version", self.version)?;
        writeln!(f, "{:<15}: {}", "expdate", self.expiration)?;
        writeln!(f, "{:<15}: {}", "quantity", self.quantity)?;
        writeln!(f, "{:<15}: {}", "notice", self.notice.as_deref().unwrap_or(""))?;
        writeln!(f, "{:<15}: {}", "issued", self.issued.as_deref().unwrap_or(""))?;
        writeln!(f, "{:<15}: {}", "start", self.start.as_deref().unwrap_or(""))?;
        writeln!(f, "{:<15}: {}", "sign", self.sign.as_deref().unwrap_or(""))?;
        match &self.status {
            Some(Ok(status)) => {
                writeln!(f, "{:<15}: {}", "used", status.used)?;
                writeln!(f, "{:<15}: {}", "total", status.total)?;
                write!(f, "{:<15}: {}", "timestamp", status.timestamp)
            }
            Some(Err(reason)) => write!(f, "{:<15}: {}", "status error", reason),
            None => write!(f, "{:<15}: {}", "status", "not queried"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::*;

    fn raw(sign: Option<&str>, others: Vec<&str>) -> RawLicense {
        let mut attrs = BTreeMap::new();
        if let Some(sign) = sign {
            attrs.insert("sign".to_owned(), sign.to_owned());
        }
        RawLicense {
            feature: "solver".to_owned(),
            vendor: "acme".to_owned(),
            version: "1.0".to_owned(),
            expdate: "permanent".to_owned(),
            quantity: 5,
            attrs,
            others: others.into_iter().map(str::to_owned).collect(),
        }
    }

    #[rstest]
    #[case(Some("abc123"), vec!["fallback"], Some("abc123"))]
    #[case(None, vec!["fallback", "unused"], Some("fallback"))]
    #[case(None, vec![], None)]
    fn status_identifier_cases(#[case] sign: Option<&str>, #[case] others: Vec<&str>, #[case] expected: Option<&str>) {
        let license = License::from_raw(&raw(sign, others));
        assert_eq!(license.status_identifier(), expected);
    }
}
