//! SIP address identity
//!
//! Participants are keyed by the remote SIP address of their call. Two
//! addresses are the same identity when scheme, user, host and port match;
//! display names and URI parameters are presentation details and do not
//! take part in the comparison.
//!
//! Parsing accepts both the `name-addr` form (`"Alice" <sip:alice@example.com>`)
//! and the bare `addr-spec` form (`sip:alice@example.com;transport=tcp`).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_till, take_till1, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::errors::{ConferenceError, Result};

type ParseResult<'a, T> = IResult<&'a str, T>;

/// URI scheme of a SIP address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

/// A parsed SIP address
#[derive(Debug, Clone)]
pub struct SipAddress {
    display_name: Option<String>,
    scheme: Scheme,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    params: Vec<(String, Option<String>)>,
}

impl SipAddress {
    /// Create a `sip:` address for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            display_name: None,
            scheme: Scheme::Sip,
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    /// Parse an address in `name-addr` or `addr-spec` form
    pub fn parse(input: &str) -> Result<Self> {
        match all_consuming(delimited(multispace0, address, multispace0))(input) {
            Ok((_, addr)) => Ok(addr),
            Err(_) => Err(ConferenceError::invalid_address(input)),
        }
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.params.push((name.into(), value.map(str::to_string)));
        self
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Value of a URI parameter; `Some(None)` for a flag parameter
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    /// The URI without display name, e.g. `sip:bob@example.com:5060;transport=tcp`
    pub fn uri_only(&self) -> String {
        let mut uri = format!("{}:", self.scheme.as_str());
        if let Some(user) = &self.user {
            uri.push_str(user);
            uri.push('@');
        }
        uri.push_str(&self.host);
        if let Some(port) = self.port {
            uri.push_str(&format!(":{}", port));
        }
        for (name, value) in &self.params {
            uri.push(';');
            uri.push_str(name);
            if let Some(value) = value {
                uri.push('=');
                uri.push_str(value);
            }
        }
        uri
    }
}

impl PartialEq for SipAddress {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.user == other.user
            && self.host.eq_ignore_ascii_case(&other.host)
            && self.port == other.port
    }
}

impl Eq for SipAddress {}

impl Hash for SipAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.user.hash(state);
        self.host.to_ascii_lowercase().hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "\"{}\" <{}>", name, self.uri_only()),
            None => f.write_str(&self.uri_only()),
        }
    }
}

impl FromStr for SipAddress {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// userinfo may carry a deprecated password after ':'
fn is_userinfo_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()%&=+$,?/:".contains(c)
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()%[]/:&+$".contains(c)
}

fn scheme(input: &str) -> ParseResult<Scheme> {
    alt((
        value(Scheme::Sips, tag_no_case("sips:")),
        value(Scheme::Sip, tag_no_case("sip:")),
    ))(input)
}

fn user(input: &str) -> ParseResult<Option<String>> {
    opt(map(
        terminated(take_while1(is_userinfo_char), char('@')),
        |userinfo: &str| {
            userinfo
                .split(':')
                .next()
                .unwrap_or(userinfo)
                .to_string()
        },
    ))(input)
}

fn host(input: &str) -> ParseResult<String> {
    map(
        alt((
            recognize(delimited(
                char('['),
                take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
                char(']'),
            )),
            take_while1(is_host_char),
        )),
        str::to_string,
    )(input)
}

fn port(input: &str) -> ParseResult<Option<u16>> {
    opt(preceded(char(':'), map_res(digit1, |s: &str| s.parse::<u16>())))(input)
}

fn params(input: &str) -> ParseResult<Vec<(String, Option<String>)>> {
    many0(preceded(
        char(';'),
        pair(
            map(take_while1(is_param_char), str::to_string),
            opt(preceded(char('='), map(take_while1(is_param_char), str::to_string))),
        ),
    ))(input)
}

fn uri_headers(input: &str) -> ParseResult<Option<&str>> {
    opt(preceded(char('?'), take_till(|c| c == '>' || c == ' ')))(input)
}

fn addr_spec(input: &str) -> ParseResult<SipAddress> {
    map(
        tuple((scheme, user, host, port, params, uri_headers)),
        |(scheme, user, host, port, params, _)| SipAddress {
            display_name: None,
            scheme,
            user,
            host,
            port,
            params,
        },
    )(input)
}

fn display_name(input: &str) -> ParseResult<String> {
    map(
        alt((
            delimited(char('"'), take_till(|c| c == '"'), char('"')),
            take_till1(|c| c == '<'),
        )),
        |name: &str| name.trim().to_string(),
    )(input)
}

fn name_addr(input: &str) -> ParseResult<SipAddress> {
    map(
        tuple((
            opt(display_name),
            multispace0,
            delimited(char('<'), addr_spec, char('>')),
        )),
        |(name, _, addr)| SipAddress {
            display_name: name.filter(|n| !n.is_empty()),
            ..addr
        },
    )(input)
}

fn address(input: &str) -> ParseResult<SipAddress> {
    alt((name_addr, addr_spec))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_addr_spec() {
        let addr = SipAddress::parse("sip:alice@example.com:5070;transport=tcp").unwrap();
        assert_eq!(addr.scheme(), Scheme::Sip);
        assert_eq!(addr.user(), Some("alice"));
        assert_eq!(addr.host(), "example.com");
        assert_eq!(addr.port(), Some(5070));
        assert_eq!(addr.param("transport"), Some(Some("tcp")));
        assert_eq!(addr.display_name(), None);
    }

    #[test]
    fn test_parse_name_addr() {
        let addr: SipAddress = "\"Bob Smith\" <sips:bob@example.org>".parse().unwrap();
        assert_eq!(addr.display_name(), Some("Bob Smith"));
        assert_eq!(addr.scheme(), Scheme::Sips);
        assert_eq!(addr.user(), Some("bob"));

        let addr: SipAddress = "Carol <sip:carol@10.0.0.1>".parse().unwrap();
        assert_eq!(addr.display_name(), Some("Carol"));
        assert_eq!(addr.host(), "10.0.0.1");
    }

    #[test]
    fn test_parse_without_user() {
        let addr = SipAddress::parse("sip:conference.example.com:5060").unwrap();
        assert_eq!(addr.user(), None);
        assert_eq!(addr.host(), "conference.example.com");
        assert_eq!(addr.port(), Some(5060));
    }

    #[test]
    fn test_parse_drops_password() {
        let addr = SipAddress::parse("sip:dave:secret@example.com").unwrap();
        assert_eq!(addr.user(), Some("dave"));
    }

    #[test]
    fn test_parse_ipv6_host() {
        let addr = SipAddress::parse("sip:erin@[2001:db8::1]:5060").unwrap();
        assert_eq!(addr.host(), "[2001:db8::1]");
        assert_eq!(addr.port(), Some(5060));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SipAddress::parse("").is_err());
        assert!(SipAddress::parse("http://example.com").is_err());
        assert!(SipAddress::parse("sip:alice@example.com trailing").is_err());
        assert!(matches!(
            SipAddress::parse("not an address"),
            Err(ConferenceError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_identity_ignores_presentation() {
        let a = SipAddress::parse("\"Alice\" <sip:alice@Example.COM;transport=udp>").unwrap();
        let b = SipAddress::parse("sip:alice@example.com").unwrap();
        assert_eq!(a, b);

        let c = SipAddress::parse("sip:alice@example.com:5062").unwrap();
        assert_ne!(b, c);

        let d = SipAddress::parse("sips:alice@example.com").unwrap();
        assert_ne!(b, d);
    }

    #[test]
    fn test_format() {
        let addr = SipAddress::new("example.com")
            .with_user("bob")
            .with_port(5060)
            .with_param("transport", Some("tcp"))
            .with_param("lr", None);
        assert_eq!(addr.uri_only(), "sip:bob@example.com:5060;transport=tcp;lr");
        assert_eq!(addr.to_string(), "sip:bob@example.com:5060;transport=tcp;lr");

        let named = addr.with_display_name("Bob");
        assert_eq!(named.to_string(), "\"Bob\" <sip:bob@example.com:5060;transport=tcp;lr>");
        assert_eq!(SipAddress::parse(&named.to_string()).unwrap(), named);
    }
}
