//! Policy summaries, which list ports but not addresses.
//!
//! A server descriptor uses one for its `ipv6-policy` entry.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::{PolicyError, PortRange, RuleKind};

/// A policy summary: a verb and a list of port ranges.
///
/// `accept 80,443` says that the relay allows most addresses on ports
/// 80 and 443; `reject 25` says it allows most addresses on every port
/// other than 25.
///
/// # Examples
/// ```
/// use tor_serverdesc::types::policy::{PortPolicy, RuleKind};
/// let policy: PortPolicy = "accept 1-1023,8000-8999,60000-65535".parse().unwrap();
///
/// assert_eq!(policy.kind(), RuleKind::Accept);
/// assert_eq!(policy.ranges().len(), 3);
/// assert_eq!(policy.to_string(), "accept 1-1023,8000-8999,60000-65535");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortPolicy {
    /// Whether the listed ports are accepted or rejected.
    kind: RuleKind,
    /// The listed port ranges.
    ///
    /// These ranges are sorted and disjoint.
    ranges: Vec<PortRange>,
}

impl Display for PortPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.keyword())?;
        for (i, range) in self.ranges.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            write!(f, "{}{}", sep, range)?;
        }
        Ok(())
    }
}

impl PortPolicy {
    /// Return whether the listed ports are accepted or rejected.
    pub fn kind(&self) -> RuleKind {
        self.kind
    }
    /// Return the listed port ranges, in order.
    pub fn ranges(&self) -> &[PortRange] {
        &self.ranges[..]
    }
    /// Append `range`, which must start after every range so far.
    fn push_range(&mut self, range: PortRange) -> Result<(), PolicyError> {
        match self.ranges.last() {
            Some(prev) if prev.hi >= range.lo => Err(PolicyError::InvalidPolicy),
            _ => {
                self.ranges.push(range);
                Ok(())
            }
        }
    }
}

impl FromStr for PortPolicy {
    type Err = PolicyError;
    fn from_str(s: &str) -> Result<Self, PolicyError> {
        let (kind, ports) = match s.split_once(' ') {
            Some(("accept", ports)) => (RuleKind::Accept, ports),
            Some(("reject", ports)) => (RuleKind::Reject, ports),
            _ => return Err(PolicyError::InvalidPolicy),
        };
        let mut policy = PortPolicy {
            kind,
            ranges: Vec::new(),
        };
        for range in ports.split(',') {
            policy.push_range(range.parse()?)?;
        }
        Ok(policy)
    }
}
