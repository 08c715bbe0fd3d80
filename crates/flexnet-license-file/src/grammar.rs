//! Line-by-line grammar for the keywords the core cares about: `USE_SERVER`, `SERVER`,
//! `VENDOR`/`DAEMON`, `INCREMENT`/`FEATURE`. `UPGRADE` and `PACKAGE` lines are recognized
//! and ignored, matching `examples/original_source/file.py::_flexnet_parse`.

use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::lexer::lex;
use crate::types::{ParsedLicenseFile, RawLicense, ServerEntry, VendorEntry};

pub fn parse(text: &str) -> ParseResult<ParsedLicenseFile> {
    let mut file = ParsedLicenseFile::default();

    for line in lex(text) {
        match line[0].as_str() {
            "USE_SERVER" => file.use_server = true,
            "SERVER" => file.servers.push(parse_server(&line)?),
            "VENDOR" | "DAEMON" => file.vendors.push(parse_vendor(&line)),
            "INCREMENT" | "FEATURE" => file.licenses.push(parse_license(&line)?),
            "UPGRADE" | "PACKAGE" => {}
            _ => {}
        }
    }

    Ok(file)
}

fn require<'a>(line: &'a [String], index: usize, keyword: &'static str) -> ParseResult<&'a str> {
    line.get(index)
        .map(String::as_str)
        .ok_or_else(|| ParseError::new("license-file grammar", ParseErrorKind::MissingToken { keyword, index }))
}

fn parse_server(line: &[String]) -> ParseResult<ServerEntry> {
    let host = require(line, 1, "SERVER")?.to_owned();
    let mut hostid = require(line, 2, "SERVER")?.to_owned();

    let mut rest = &line[3.min(line.len())..];
    while rest.first().map(String::as_str) == Some("=") && rest.len() >= 2 {
        hostid.push_str(&rest[0]);
        hostid.push_str(&rest[1]);
        rest = &rest[2..];
    }

    let port = match rest.first() {
        Some(token) => Some(
            token
                .parse::<u16>()
                .map_err(|_| ParseError::new("license-file grammar", ParseErrorKind::InvalidPort { value: token.clone() }))?,
        ),
        None => None,
    };

    Ok(ServerEntry { host, hostid, port })
}

fn parse_vendor(line: &[String]) -> VendorEntry {
    VendorEntry {
        name: line[1].clone(),
        daemon_path: line.get(2).cloned(),
    }
}

fn parse_license(line: &[String]) -> ParseResult<RawLicense> {
    let feature = require(line, 1, "INCREMENT")?.to_owned();
    let vendor = require(line, 2, "INCREMENT")?.to_owned();
    let version = require(line, 3, "INCREMENT")?.to_owned();
    let expdate = require(line, 4, "INCREMENT")?.to_owned();
    let quantity_token = require(line, 5, "INCREMENT")?;

    let quantity = if quantity_token == "uncounted" {
        0
    } else {
        quantity_token
            .parse::<u32>()
            .map_err(|_| ParseError::new("license-file grammar", ParseErrorKind::InvalidQuantity { value: quantity_token.to_owned() }))?
    };

    let (attrs, others) = parse_trailing_pairs(&line[6.min(line.len())..]);

    Ok(RawLicense {
        feature,
        vendor,
        version,
        expdate,
        quantity,
        attrs,
        others,
    })
}

/// Consumes `KEY = VALUE` triples out of the trailing tokens, de-quoting the value and
/// letting a run of `= TOKEN` continuations extend it (mirrors the `while opts.count('=')`
/// loop in `file.py`). Unpaired tokens are returned as `others`.
fn parse_trailing_pairs(tokens: &[String]) -> (std::collections::BTreeMap<String, String>, Vec<String>) {
    let mut attrs = std::collections::BTreeMap::new();
    let mut opts: Vec<String> = tokens.to_vec();

    while let Some(eq_pos) = opts.iter().position(|t| t == "=") {
        if eq_pos == 0 || eq_pos + 1 >= opts.len() {
            break;
        }

        let key = opts[eq_pos - 1].trim_matches('"').to_lowercase();
        let mut value = opts[eq_pos + 1].trim_matches('"').to_owned();
        let continuation_pos = eq_pos - 1;

        // Remove value, '=', and key (right to left) so earlier indices stay valid.
        opts.remove(eq_pos + 1);
        opts.remove(eq_pos);
        opts.remove(eq_pos - 1);

        // Additional `= TOKEN` pairs immediately following extend the value as one string.
        while opts.len() > continuation_pos + 1 && opts.get(continuation_pos).map(String::as_str) == Some("=") {
            value.push_str(&opts.remove(continuation_pos));
            value.push_str(opts.remove(continuation_pos).trim_matches('"'));
        }

        attrs.insert(key, value);
    }

    (attrs, opts)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_increment_with_quoted_attrs() {
        let file = parse(r#"INCREMENT widget acme 1.0 31-dec-2030 5 SIGN="ABCD" NOTICE="site A""#).unwrap();
        let lic = &file.licenses[0];
        assert_eq!(lic.feature, "widget");
        assert_eq!(lic.vendor, "acme");
        assert_eq!(lic.version, "1.0");
        assert_eq!(lic.expdate, "31-dec-2030");
        assert_eq!(lic.quantity, 5);
        assert_eq!(lic.sign(), Some("ABCD"));
        assert_eq!(lic.notice(), Some("site A"));
    }

    #[test]
    fn uncounted_quantity_maps_to_zero() {
        let file = parse("INCREMENT widget acme 1.0 31-dec-2030 uncounted").unwrap();
        assert_eq!(file.licenses[0].quantity, 0);
    }

    #[test]
    fn license_missing_sign_falls_back_to_first_other_token() {
        let file = parse("INCREMENT widget acme 1.0 31-dec-2030 5 someopaquekey").unwrap();
        let lic = &file.licenses[0];
        assert_eq!(lic.sign(), None);
        assert_eq!(lic.status_identifier(), Some("someopaquekey"));
    }

    #[test]
    fn server_hostid_concatenates_repeated_equals_tokens() {
        let file = parse("SERVER myhost 001122 = 334455 = 667788 27000").unwrap();
        let server = &file.servers[0];
        assert_eq!(server.host, "myhost");
        assert_eq!(server.hostid, "001122=334455=667788");
        assert_eq!(server.port, Some(27000));
    }

    #[test]
    fn server_without_port_is_none() {
        let file = parse("SERVER myhost 001122").unwrap();
        assert_eq!(file.servers[0].port, None);
    }

    #[rstest]
    #[case("VENDOR acme /opt/acme/lmgrd", "acme", Some("/opt/acme/lmgrd"))]
    #[case("DAEMON other", "other", None)]
    fn vendor_and_daemon_lines_both_recognized(
        #[case] line: &str,
        #[case] name: &str,
        #[case] daemon_path: Option<&str>,
    ) {
        let file = parse(line).unwrap();
        assert_eq!(file.vendors[0].name, name);
        assert_eq!(file.vendors[0].daemon_path.as_deref(), daemon_path);
    }

    #[test]
    fn use_server_flag_is_set() {
        let file = parse("USE_SERVER\n").unwrap();
        assert!(file.use_server);
    }

    #[rstest]
    #[case("UPGRADE widget acme 1.0 2.0 31-dec-2030")]
    #[case("PACKAGE foo acme 1.0")]
    fn unknown_keywords_are_ignored(#[case] line: &str) {
        let file = parse(line).unwrap();
        assert!(file.licenses.is_empty());
        assert!(file.vendors.is_empty());
    }

    #[test]
    fn idempotent_under_whitespace_normalization() {
        let a = parse("INCREMENT   widget\tacme  1.0 31-dec-2030   5").unwrap();
        let b = parse("INCREMENT widget acme 1.0 31-dec-2030 5").unwrap();
        assert_eq!(a, b);
    }
}
