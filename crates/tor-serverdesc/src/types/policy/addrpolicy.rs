//! Address policies: the ordered `accept` and `reject` rules of a
//! server descriptor.

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::{PolicyError, PortRange};

/// A sequence of rules that a relay applies to an address:port until
/// one matches.
///
/// Each rule is of the form "accept PATTERN" or "reject PATTERN".  The
/// rules are kept in the order they were given: the order is what
/// gives the policy its meaning, so we never sort or merge them.
///
/// For instance, a relay that exits only to web ports might publish:
///
/// ```ignore
///  reject 0.0.0.0/8:*
///  reject 10.0.0.0/8:*
///  accept *:80
///  accept *:443
///  reject *:*
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddrPolicy {
    /// The rules of this policy, in the order they appeared.
    rules: Vec<AddrPolicyRule>,
}

/// What a policy rule does with the traffic its pattern matches.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(clippy::exhaustive_enums)]
pub enum RuleKind {
    /// Allow it.
    Accept,
    /// Refuse it.
    Reject,
}

impl RuleKind {
    /// Return the keyword that introduces a rule of this kind.
    pub fn keyword(&self) -> &'static str {
        match self {
            RuleKind::Accept => "accept",
            RuleKind::Reject => "reject",
        }
    }
}

impl AddrPolicy {
    /// Create a new AddrPolicy with no rules.
    pub fn new() -> Self {
        AddrPolicy { rules: Vec::new() }
    }

    /// Append a rule, to be tried after all the existing ones.
    ///
    /// The newly added rule comes _after_ all previous rules.
    pub fn push(&mut self, kind: RuleKind, pattern: AddrPortPattern) {
        self.rules.push(AddrPolicyRule { kind, pattern })
    }

    /// Return the rules of this policy, in order.
    pub fn rules(&self) -> &[AddrPolicyRule] {
        &self.rules[..]
    }

    /// Return true if this policy has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// One `accept` or `reject` line of an address policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrPolicyRule {
    /// Accept or reject.
    kind: RuleKind,
    /// The addresses and ports this rule covers.
    pattern: AddrPortPattern,
}

impl AddrPolicyRule {
    /// Return whether this rule accepts or rejects.
    pub fn kind(&self) -> RuleKind {
        self.kind
    }
    /// Return the pattern this rule applies to.
    pub fn pattern(&self) -> &AddrPortPattern {
        &self.pattern
    }
}

impl Display for AddrPolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind.keyword(), self.pattern)
    }
}

/// A pattern describing a set of addresses and ports.
///
/// Each AddrPortPattern has an IP pattern and a port pattern.  A port
/// pattern of `None` stands for `*`.
///
/// # Example
///
/// ```
/// use tor_serverdesc::types::policy::AddrPortPattern;
/// let pat: AddrPortPattern = "192.168.0.0/16:*".parse().unwrap();
/// assert_eq!(pat.ports(), None);
/// assert_eq!(pat.to_string(), "192.168.0.0/16:*");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrPortPattern {
    /// Which addresses match.
    pattern: IpPattern,
    /// A range of ports, or None for "*".
    ports: Option<PortRange>,
}

impl AddrPortPattern {
    /// Return the address part of this pattern.
    pub fn ip_pattern(&self) -> &IpPattern {
        &self.pattern
    }
    /// Return the port part of this pattern, or None if it was `*`.
    pub fn ports(&self) -> Option<PortRange> {
        self.ports
    }
}

impl Display for AddrPortPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ports {
            None => write!(f, "{}:*", self.pattern),
            Some(p) => write!(f, "{}:{}", self.pattern, p),
        }
    }
}

impl FromStr for AddrPortPattern {
    type Err = PolicyError;
    fn from_str(s: &str) -> Result<Self, PolicyError> {
        // IPv6 addresses contain colons too, so split at the last one.
        let (addr, ports_s) = s.rsplit_once(':').ok_or(PolicyError::InvalidPolicy)?;
        let pattern: IpPattern = addr.parse()?;
        let ports = if ports_s == "*" {
            None
        } else {
            Some(ports_s.parse()?)
        };

        Ok(AddrPortPattern { pattern, ports })
    }
}

/// The address half of an AddrPortPattern.
///
/// The pattern keeps the address and mask just as they were written,
/// so that displaying it gives back the original text.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IpPattern {
    /// `*`: match all addresses.
    Star,
    /// An IPv4 address, with an optional mask length.
    V4(Ipv4Addr, Option<u8>),
    /// A bracketed IPv6 address, with an optional mask length.
    V6(Ipv6Addr, Option<u8>),
}

impl Display for IpPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use IpPattern::*;
        match self {
            Star => write!(f, "*"),
            V4(a, None) => write!(f, "{}", a),
            V4(a, Some(m)) => write!(f, "{}/{}", a, m),
            V6(a, None) => write!(f, "[{}]", a),
            V6(a, Some(m)) => write!(f, "[{}]/{}", a, m),
        }
    }
}

/// Parse a bare IPv4 address or a bracketed IPv6 address.
fn parse_addr(s: &str) -> Result<IpAddr, PolicyError> {
    let inner = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']'));
    match inner {
        Some(v6) => v6.parse::<Ipv6Addr>().map(IpAddr::V6),
        None => s.parse::<Ipv4Addr>().map(IpAddr::V4),
    }
    .map_err(|_| PolicyError::InvalidAddress)
}

impl FromStr for IpPattern {
    type Err = PolicyError;
    fn from_str(s: &str) -> Result<Self, PolicyError> {
        let (ip_s, mask_s) = match s.split_once('/') {
            Some((ip, mask)) => (ip, Some(mask)),
            None => (s, None),
        };
        if ip_s == "*" {
            return match mask_s {
                Some(_) => Err(PolicyError::MaskWithStar),
                None => Ok(IpPattern::Star),
            };
        }
        let mask = match mask_s {
            Some(m) if !m.is_empty() && m.bytes().all(|b| b.is_ascii_digit()) => {
                Some(m.parse::<u8>().map_err(|_| PolicyError::InvalidMask)?)
            }
            Some(_) => return Err(PolicyError::InvalidMask),
            None => None,
        };
        match (parse_addr(ip_s)?, mask) {
            (IpAddr::V4(a), m) if m.map_or(true, |m| m <= 32) => Ok(IpPattern::V4(a, m)),
            (IpAddr::V6(a), m) if m.map_or(true, |m| m <= 128) => Ok(IpPattern::V6(a, m)),
            _ => Err(PolicyError::InvalidMask),
        }
    }
}
