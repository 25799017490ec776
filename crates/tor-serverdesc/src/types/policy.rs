//! Exit policies: patterns of addresses and ports.
//!
//! A relay's server descriptor lists its exit policy in two forms.  The
//! `accept` and `reject` entries make up a "full policy": an ordered
//! list of rules, where the first rule to match an address and port
//! decides the outcome.  We represent this with the AddrPolicy type.
//!
//! The `ipv6-policy` entry gives a summary instead: a single accept or
//! reject verb followed by a list of ports.  We represent this kind of
//! policy with the PortPolicy type.
//!
//! Both types only record the structure of a policy, exactly as it was
//! written; they don't evaluate it.

mod addrpolicy;
mod portpolicy;

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

pub use addrpolicy::{AddrPolicy, AddrPolicyRule, AddrPortPattern, IpPattern, RuleKind};
pub use portpolicy::PortPolicy;

/// A problem found while parsing part of a policy.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PolicyError {
    /// Something that should have been a port wasn't a decimal number
    /// between 1 and 65535.
    #[error("bad port number")]
    InvalidPort,
    /// A port range ended before it began.
    #[error("port range is backwards")]
    InvalidRange,
    /// Something that should have been an address wasn't.
    #[error("bad address")]
    InvalidAddress,
    /// The address `*` was given a mask.
    #[error("the address \"*\" cannot take a mask")]
    MaskWithStar,
    /// A mask length was malformed, or too long for its address family.
    #[error("bad mask length")]
    InvalidMask,
    /// The policy was malformed in some other way.
    #[error("malformed policy")]
    InvalidPolicy,
}

/// An inclusive range of TCP ports, such as `22-8000` or `443`.
///
/// Port 0 is never part of a range.
///
/// # Example
/// ```
/// use tor_serverdesc::types::policy::PortRange;
///
/// let r: PortRange = "22-8000".parse().unwrap();
/// assert_eq!((r.lo, r.hi), (22, 8000));
/// assert_eq!(r.to_string(), "22-8000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::exhaustive_structs)]
pub struct PortRange {
    /// Lowest port in the range.
    pub lo: u16,
    /// Highest port in the range.
    pub hi: u16,
}

impl PortRange {
    /// Return the range `1-65535`.
    pub fn new_all() -> Self {
        PortRange {
            lo: 1,
            hi: u16::MAX,
        }
    }
    /// Return the range from `lo` through `hi`.
    ///
    /// Gives None if `hi` is below `lo`. Port 0 is allowed: relays
    /// sometimes name it in their policies.
    pub fn new(lo: u16, hi: u16) -> Option<Self> {
        (hi >= lo).then(|| PortRange { lo, hi })
    }
    /// Return true if every port is in this range.
    pub fn is_all(&self) -> bool {
        *self == Self::new_all()
    }
    /// Return the number of ports in this range.
    pub fn n_ports(&self) -> u32 {
        u32::from(self.hi) - u32::from(self.lo) + 1
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lo)?;
        if self.hi != self.lo {
            write!(f, "-{}", self.hi)?;
        }
        Ok(())
    }
}

/// Parse a bare decimal port number.
///
/// Unlike `u16::from_str`, this rejects a leading `+`.
fn parse_port(s: &str) -> Result<u16, PolicyError> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().map_err(|_| PolicyError::InvalidPort)
    } else {
        Err(PolicyError::InvalidPort)
    }
}

impl FromStr for PortRange {
    type Err = PolicyError;
    fn from_str(s: &str) -> Result<Self, PolicyError> {
        let (lo, hi) = match s.split_once('-') {
            Some((lo, hi)) => (parse_port(lo)?, parse_port(hi)?),
            None => {
                let port = parse_port(s)?;
                (port, port)
            }
        };
        PortRange::new(lo, hi).ok_or(PolicyError::InvalidRange)
    }
}
