//! The conversation state machine: dial a manager, greet it, discover vendors, and
//! sweep each one for its feature list, catalog, and live license status.
//!
//! Unlike `ironrdp-connector`'s sans-io `Sequence`/`step()` state machine, this one
//! drives its own blocking sockets directly. The wire protocol here has no handshake
//! renegotiation or user-in-the-loop credential prompts to suspend for, so there's
//! nothing for a caller-driven step loop to buy beyond indirection.

use std::io::Write;
use std::net::TcpStream;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flexnet_license_file::ParsedLicenseFile;
use flexnet_proto::{
    decode_message, encode_hello, encode_legacy_status_request, encode_req_body, encode_reqlic_body, Frame, Framed,
    HelloFields, Message, MessageType, LEGACY_FEATURE_QUERY_MAGIC, LICSET_REQUEST_BODY, STUB_DEFAULT_BODY,
};

use crate::domain::{License, LicenseSet, LicenseStatus, Server, Vendor};
use crate::error::{ClientError, ClientErrorExt, ClientResult};
use crate::identity::{ClientIdentity, Config};
use crate::status::StatusQuery;

/// Which envelope dialect a connection uses, fixed by the server version reported on
/// the first `HELLO` of that connection and never renegotiated afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Legacy,
    Modern,
}

impl Dialect {
    fn from_server_version(version: (u8, u8)) -> Self {
        if version < (11, 10) {
            Self::Legacy
        } else {
            Self::Modern
        }
    }
}

/// A connected socket plus the dialect negotiated on it.
struct Connection {
    framed: Framed<TcpStream>,
    host: String,
    port: u16,
    dialect: Dialect,
    daemon: String,
}

impl Connection {
    fn connect(host: &str, port: u16, timeout: Duration) -> ClientResult<Self> {
        let stream = TcpStream::connect((host, port)).map_err(|e| ClientError::io("connect", e))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| ClientError::io("set read timeout", e))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| ClientError::io("set write timeout", e))?;

        Ok(Self {
            framed: Framed::new(stream),
            host: host.to_owned(),
            port,
            dialect: Dialect::Modern,
            daemon: String::new(),
        })
    }

    fn query(&mut self, request: &[u8]) -> ClientResult<Message> {
        self.framed.write_all(request).map_err(|e| ClientError::io("write request", e))?;
        let frame = self.framed.read_frame().map_err(ClientError::decode)?;
        decode_message(&frame).map_err(ClientError::decode)
    }

    /// Sends `HELLO` naming `vendor` (empty for a manager greeting) and returns the
    /// raw decoded reply: `Hello` from a manager or vendor daemon greeting, `Stubr`
    /// from a manager redirecting to a named vendor's host and port.
    fn send_hello(&mut self, identity: &ClientIdentity, vendor: &str) -> ClientResult<Message> {
        let fields = HelloFields {
            user: &identity.user,
            host: &identity.host,
            vendor,
            tty: &identity.tty,
            pid: &identity.pid,
            arch: &identity.arch,
            version: identity.version,
        };
        let packet = encode_hello(&fields);
        self.query(&packet)
    }

    /// Greets the manager, follows a redundant manager's redirect to its reported
    /// hostname if one is offered, and settles this connection's dialect.
    fn greet(&mut self, identity: &ClientIdentity, config: &Config) -> ClientResult<()> {
        loop {
            let (hostname, daemon, server_version) = match self.send_hello(identity, "")? {
                Message::Hello { hostname, daemon, server_version } => (hostname, daemon, server_version),
                other => return Err(unexpected(other, "HELLO")),
            };
            self.dialect = Dialect::from_server_version(server_version);
            self.daemon = daemon;

            if config.follow_redundant_manager_redirect && hostname != self.host && !hostname.is_empty() {
                tracing::debug!(reported = %hostname, dialed = %self.host, "reconnecting to redundant manager");
                *self = Self::connect(&hostname, self.port, config.io_timeout)?;
                continue;
            }

            self.host = hostname;
            return Ok(());
        }
    }

    fn req(&mut self, identity: &ClientIdentity, command: &str) -> ClientResult<Vec<String>> {
        let body = encode_req_body(&identity.user, &identity.host, &self.daemon, &identity.tty, command);
        let packet = flexnet_proto::write_frame(MessageType::Req.as_u16(), unix_timestamp(), &body);
        match self.query(&packet)? {
            Message::Text { fields } => Ok(fields),
            other => Err(unexpected(other, "RESP")),
        }
    }

    /// Sends a modern `STUB`/`LICSET`/`REQLIC` request and returns the raw decoded message.
    fn stub(&mut self, message_type: MessageType, body: &[u8]) -> ClientResult<Message> {
        let packet = flexnet_proto::write_frame(message_type.as_u16(), unix_timestamp(), body);
        self.query(&packet)
    }
}

fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn unexpected(got: Message, expected: &'static str) -> ClientError {
    ClientError::unexpected_message("conversation step", expected).with_source(GotMessage(format!("{got:?}")))
}

#[derive(Debug)]
struct GotMessage(String);

impl std::fmt::Display for GotMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "got {}", self.0)
    }
}

impl std::error::Error for GotMessage {}

/// Entry point: dial one manager and sweep its full estate.
pub struct Client {
    identity: ClientIdentity,
    config: Config,
}

impl Client {
    pub fn new(identity: ClientIdentity, config: Config) -> Self {
        Self { identity, config }
    }

    /// Connects to `host:port`, greets the manager, discovers every vendor it serves,
    /// and queries each vendor's features, catalog, and per-license status.
    #[tracing::instrument(skip_all, fields(host, port))]
    pub fn query_everything(&self, host: &str, port: u16) -> ClientResult<Server> {
        let mut manager = Connection::connect(host, port, self.config.io_timeout)?;
        manager.greet(&self.identity, &self.config)?;

        let license_file_path = manager.req(&self.identity, "getpaths")?.into_iter().next();

        let (license_file, license_file_text) = if self.config.fetch_license_file_text {
            let text_fields = manager.req(&self.identity, "")?;
            let text = text_fields.join("\n");
            let parsed = flexnet_license_file::parse(&text).map_err(ClientError::parse)?;
            (Some(parsed), Some(text))
        } else {
            (None, None)
        };

        let vendor_names = manager.req(&self.identity, "dlist")?;
        let mut vendors = Vec::with_capacity(vendor_names.len());
        for name in vendor_names {
            let (vendor_hostname, vendor_port) = manager_stubr(&mut manager, &self.identity, &name)?;
            vendors.push(self.query_vendor(&name, &vendor_hostname, vendor_port, license_file.as_ref())?);
        }

        Ok(Server {
            hostname: manager.host.clone(),
            port: manager.port,
            daemon: manager.daemon.clone(),
            version: self.identity.version,
            license_file_path,
            license_file_text,
            vendors,
        })
    }

    #[tracing::instrument(skip_all, fields(name, hostname, port))]
    fn query_vendor(
        &self,
        name: &str,
        hostname: &str,
        port: u32,
        license_file: Option<&ParsedLicenseFile>,
    ) -> ClientResult<Vendor> {
        let mut conn = Connection::connect(hostname, port as u16, self.config.io_timeout)?;
        conn.greet(&self.identity, &self.config)?;

        let features = self.query_vendor_features(&mut conn)?;

        let license_sets = match conn.dialect {
            Dialect::Modern => self.query_vendor_catalog(&mut conn)?,
            Dialect::Legacy => Vec::new(),
        };

        let mut licenses: Vec<License> = license_sets.iter().flat_map(|set| set.licenses.clone()).collect();
        if let Some(file) = license_file {
            for raw in &file.licenses {
                if raw.vendor == name {
                    licenses.push(License::from_raw(raw));
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        licenses.retain(|license| seen.insert((license.feature.clone(), license.sign.clone())));

        for license in &mut licenses {
            license.status = match license.status_identifier() {
                Some(_) => Some(self.query_license_status(&mut conn, license).map_err(|e| e.report().to_string())),
                None => None,
            };
        }

        Ok(Vendor {
            name: name.to_owned(),
            hostname: hostname.to_owned(),
            port,
            features,
            license_sets,
            licenses,
        })
    }

    fn query_vendor_features(&self, conn: &mut Connection) -> ClientResult<Vec<String>> {
        match conn.dialect {
            Dialect::Modern => match conn.stub(MessageType::Stub, &STUB_DEFAULT_BODY)? {
                Message::Text { fields } => Ok(fields),
                other => Err(unexpected(other, "STUB feature list")),
            },
            Dialect::Legacy => {
                let packet = flexnet_proto::pad_legacy_blob(&LEGACY_FEATURE_QUERY_MAGIC);
                conn.framed.write_all(&packet).map_err(|e| ClientError::io("write legacy feature query", e))?;
                let frame = conn.framed.read_frame().map_err(ClientError::decode)?;
                match decode_message(&frame).map_err(ClientError::decode)? {
                    Message::Text { fields } => Ok(fields),
                    other => Err(unexpected(other, "legacy feature list")),
                }
            }
        }
    }

    fn query_vendor_catalog(&self, conn: &mut Connection) -> ClientResult<Vec<LicenseSet>> {
        let fields = match conn.stub(MessageType::LicSet, &LICSET_REQUEST_BODY)? {
            Message::Stub2 { fields } => fields,
            other => return Err(unexpected(other, "STUB2 catalog")),
        };
        let fields: Vec<String> = fields.into_iter().filter(|f| !f.trim().is_empty()).collect();

        const CHUNK: usize = 8;
        let mut sets = Vec::with_capacity(fields.len() / CHUNK);
        for chunk in fields.chunks(CHUNK) {
            if chunk.len() < CHUNK {
                tracing::warn!(leftover = chunk.len(), "dropping short trailing catalog chunk");
                break;
            }
            // Index 0 and index 5 are both documented as `fid`; the vendor daemon's own
            // client overwrites index 0's assignment with index 5's when building its
            // per-license-set dict, so index 5 is the real fid and index 0 is discarded.
            let (licenses, parse_error) = match flexnet_license_file::parse(&chunk[7]) {
                Ok(parsed) => (parsed.licenses.iter().map(License::from_raw).collect(), None),
                Err(e) => {
                    tracing::warn!(fid = %chunk[5], error = %e.report(), "license set text failed to parse");
                    (Vec::new(), Some(e.report().to_string()))
                }
            };
            sets.push(LicenseSet {
                fid: chunk[5].clone(),
                sig: chunk[1].clone(),
                names: chunk[2].clone(),
                date1: chunk[3].clone(),
                date2: chunk[4].clone(),
                url: chunk[6].clone(),
                licenses,
                parse_error,
            });
        }
        Ok(sets)
    }

    #[tracing::instrument(skip_all, fields(feature = %license.feature))]
    fn query_license_status(&self, conn: &mut Connection, license: &License) -> ClientResult<LicenseStatus> {
        let Some(identifier) = license.status_identifier() else {
            return Err(ClientError::general("no status identifier available for this license"));
        };

        let (used, total, timestamp) = match conn.dialect {
            Dialect::Modern => {
                let body = encode_reqlic_body(&license.feature, identifier);
                match conn.stub(MessageType::ReqLic, &body)? {
                    Message::ReqLic1 { used, total, timestamp } => (used, total, timestamp),
                    other => return Err(unexpected(other, "REQLIC1 status")),
                }
            }
            Dialect::Legacy => {
                let packet = encode_legacy_status_request(&license.feature, identifier);
                conn.framed.write_all(&packet).map_err(|e| ClientError::io("write legacy status query", e))?;

                // Some upstream servers (observed against Cadence vendor daemons) emit
                // stray frames ahead of the real status response. Discard and count
                // them rather than trying to reattribute them to an earlier license.
                let mut discarded = 0u32;
                loop {
                    let frame = conn.framed.read_frame().map_err(ClientError::decode)?;
                    match frame {
                        Frame::LegacyChunked { .. } => {
                            let message = decode_message(&frame).map_err(ClientError::decode)?;
                            match message {
                                Message::Text { fields } if fields.len() >= 3 => {
                                    let used = fields[0]
                                        .parse::<u32>()
                                        .map_err(|_| ClientError::general("legacy status `used` not decimal"))?;
                                    let total = fields[1]
                                        .parse::<u32>()
                                        .map_err(|_| ClientError::general("legacy status `total` not decimal"))?;
                                    let timestamp = fields[2]
                                        .parse::<u32>()
                                        .map_err(|_| ClientError::general("legacy status `timestamp` not decimal"))?;
                                    break (used, total, timestamp);
                                }
                                _ => {
                                    discarded += 1;
                                    tracing::warn!(discarded, "discarding malformed legacy status frame");
                                }
                            }
                        }
                        _ => {
                            discarded += 1;
                            tracing::warn!(discarded, "discarding stray frame before legacy status response");
                        }
                    }
                }
            }
        };

        let usage = StatusQuery::new(&mut conn.framed, used).drain_all()?;
        Ok(LicenseStatus { used, total, timestamp, usage })
    }

    /// Renders a server's full estate the way `examples/original_source/client.py`'s
    /// `report_everything()` does: server header, the raw license-file text, then one
    /// block per vendor with its features, licenses, and license sets.
    pub fn report_everything(server: &Server, mut out: impl Write) -> std::io::Result<()> {
        writeln!(out, "Server hostname:   {}", server.hostname)?;
        writeln!(out, "Server daemon:     {}", server.daemon)?;
        writeln!(out, "Server version:    {}.{}", server.version.0, server.version.1)?;
        writeln!(out, "License File Path: {}", server.license_file_path.as_deref().unwrap_or(""))?;
        writeln!(
            out,
            "Vendor daemons:    {}",
            server.vendors.iter().map(|v| v.name.as_str()).collect::<Vec<_>>().join(", ")
        )?;
        writeln!(out, "License File:")?;
        writeln!(out, "{}", server.license_file_text.as_deref().unwrap_or(""))?;

        for vendor in &server.vendors {
            writeln!(out, "vendor {} at {}@{}", vendor.name, vendor.port, vendor.hostname)?;
            writeln!(out)?;
            writeln!(out, "Features:")?;
            for feature in &vendor.features {
                writeln!(out, "   {feature}")?;
            }
            writeln!(out, "Licenses:")?;
            for license in &vendor.licenses {
                writeln!(out)?;
                writeln!(out, "{license}")?;
            }
            for (i, set) in vendor.license_sets.iter().enumerate() {
                writeln!(out, "  License Set {i}:")?;
                writeln!(out, "{set}")?;
            }
        }
        Ok(())
    }
}

fn manager_stubr(conn: &mut Connection, identity: &ClientIdentity, vendor: &str) -> ClientResult<(String, u32)> {
    match conn.send_hello(identity, vendor)? {
        Message::Stubr { vendor_hostname, vendor_port } => Ok((vendor_hostname, vendor_port)),
        other => Err(unexpected(other, "STUBR redirect")),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case((11, 9), Dialect::Legacy)]
    #[case((11, 10), Dialect::Modern)]
    #[case((11, 11), Dialect::Modern)]
    #[case((10, 99), Dialect::Legacy)]
    fn dialect_switches_at_eleven_ten(#[case] version: (u8, u8), #[case] expected: Dialect) {
        assert_eq!(Dialect::from_server_version(version), expected);
    }
}
