//! Tor versions, and the platform strings that carry them.
//!
//! A Tor version is three or four dotted numbers, optionally followed
//! by a release tag such as `-rc` and then by `-dev`: for example
//! `0.4.3.1-alpha-dev`.  See Tor's
//! [version-spec.txt](https://spec.torproject.org/version-spec).
//!
//! A relay announces its version in the `platform` entry of its server
//! descriptor, as in `Tor 0.2.5.10 on Linux`.
//!
//! # Examples
//!
//! ```
//! use tor_serverdesc::types::version::{RelayPlatform, TorVersion};
//! let older: TorVersion = "0.2.5.10".parse()?;
//! let latest: TorVersion = "0.4.3.4-rc".parse()?;
//! assert!(older < latest);
//!
//! let p: RelayPlatform = "Tor 0.2.5.10 on Linux".parse()?;
//! assert_eq!(p, RelayPlatform::Tor(older, "Linux".into()));
//! # tor_serverdesc::Result::Ok(())
//! ```

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::{Error, Pos};

/// The release stage named by the tag after a version's numbers.
///
/// Variants are ordered so that later stages compare greater.  Tags we
/// don't know sort before all the others.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
enum ReleaseStage {
    /// A tag we don't recognize.
    Unknown,
    /// `-alpha`
    Alpha,
    /// `-beta`
    Beta,
    /// `-rc`
    Candidate,
    /// No tag at all.
    Stable,
}

impl ReleaseStage {
    /// Map a status tag (without its dash) to a stage.
    fn from_tag(tag: &str) -> Self {
        match tag {
            "alpha" => ReleaseStage::Alpha,
            "beta" => ReleaseStage::Beta,
            "rc" => ReleaseStage::Candidate,
            _ => ReleaseStage::Unknown,
        }
    }
    /// Return the text to write after the version numbers.
    fn tag(self) -> &'static str {
        match self {
            ReleaseStage::Unknown => "-???",
            ReleaseStage::Alpha => "-alpha",
            ReleaseStage::Beta => "-beta",
            ReleaseStage::Candidate => "-rc",
            ReleaseStage::Stable => "",
        }
    }
}

/// A parsed Tor version number.
///
/// Versions compare by their numbers first, then by release stage,
/// and finally with a "-dev" build sorting after the same version
/// without one.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TorVersion {
    /// Major, minor, micro, and patchlevel.  A missing patchlevel is 0.
    nums: [u8; 4],
    /// Release stage.
    stage: ReleaseStage,
    /// Whether the version ended in "-dev".
    dev: bool,
}

impl TorVersion {
    /// Return the (major, minor, micro, patchlevel) numbers of this
    /// version.
    pub fn numbers(&self) -> (u8, u8, u8, u8) {
        let [a, b, c, d] = self.nums;
        (a, b, c, d)
    }
    /// Return true if this is a "-dev" version.
    pub fn is_dev(&self) -> bool {
        self.dev
    }
}

impl Display for TorVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.nums;
        write!(f, "{}.{}.{}.{}{}", a, b, c, d, self.stage.tag())?;
        if self.dev {
            write!(f, "-dev")?;
        }
        Ok(())
    }
}

impl FromStr for TorVersion {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let bad = || Error::BadTorVersion(Pos::at(s));

        let mut tags = s.split('-');
        let numbers = tags.next().unwrap_or(s);
        let mut nums = [0_u8; 4];
        let mut n_nums = 0;
        for field in numbers.split('.') {
            let slot = nums.get_mut(n_nums).ok_or_else(bad)?;
            *slot = field.parse().map_err(|_| bad())?;
            n_nums += 1;
        }
        if n_nums < 3 {
            return Err(bad());
        }

        // A stable dev build is written "0.1.2.3-dev", with "dev" where
        // the stage would go.
        let (stage, dev) = match (tags.next(), tags.next(), tags.next()) {
            (None, _, _) => (ReleaseStage::Stable, false),
            (Some("dev"), None, _) => (ReleaseStage::Stable, true),
            (Some(tag), None, _) => (ReleaseStage::from_tag(tag), false),
            (Some(tag), Some("dev"), None) => (ReleaseStage::from_tag(tag), true),
            (Some(_), Some(other), None) => return Err(Error::BadTorVersion(Pos::at(other))),
            (Some(_), Some(_), Some(_)) => return Err(bad()),
        };

        Ok(TorVersion { nums, stage, dev })
    }
}

/// The software a relay says it runs, from its `platform` entry.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RelayPlatform {
    /// A platform of the form `Tor VERSION on OS`.
    Tor(TorVersion, String),
    /// Any other platform string, kept as it was.
    Other(String),
}

impl FromStr for RelayPlatform {
    type Err = Error;
    fn from_str(s: &str) -> crate::Result<Self> {
        if let Some(rest) = s.strip_prefix("Tor ") {
            let (ver, os) = match rest.find(" on ") {
                Some(idx) => (&rest[..idx], &rest[idx + 4..]),
                None => (rest, ""),
            };
            // Anything after a space in the version is extra info.
            let ver = ver.split(' ').next().unwrap_or(ver);
            let ver: TorVersion = ver.parse()?;
            Ok(RelayPlatform::Tor(ver, os.to_string()))
        } else {
            Ok(RelayPlatform::Other(s.to_string()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_good() {
        let mut lastver = None;
        for (s1, s2) in &[
            ("0.1.2", "0.1.2.0"),
            ("0.1.2.0-dev", "0.1.2.0-dev"),
            ("0.4.3.1-bloop", "0.4.3.1-???"),
            ("0.4.3.1-alpha", "0.4.3.1-alpha"),
            ("0.4.3.1-alpha-dev", "0.4.3.1-alpha-dev"),
            ("0.4.3.1-beta", "0.4.3.1-beta"),
            ("0.4.3.1-rc", "0.4.3.1-rc"),
            ("0.4.3.1", "0.4.3.1"),
        ] {
            let t: TorVersion = s1.parse().unwrap();
            assert_eq!(&t.to_string(), s2);

            if let Some(v) = lastver {
                assert!(v < t);
            }
            lastver = Some(t);
        }
        let v: TorVersion = "0.2.5.10".parse().unwrap();
        assert_eq!(v.numbers(), (0, 2, 5, 10));
        assert!(!v.is_dev());
    }

    #[test]
    fn parse_bad() {
        for s in &[
            "fred.and.bob",
            "11",
            "11.22",
            "0x2020",
            "1.2.3.marzipan",
            "1.2.3.4.5",
            "0.1.2.5-alpha-deeev",
            "0.1.2.5-alpha-dev-dev",
        ] {
            assert!(s.parse::<TorVersion>().is_err());
        }
    }

    #[test]
    fn platform() {
        let p: RelayPlatform = "Tor 0.2.5.10 on Linux".parse().unwrap();
        assert_eq!(
            p,
            RelayPlatform::Tor("0.2.5.10".parse().unwrap(), "Linux".into())
        );
        let p: RelayPlatform = "Tor 0.4.8.9 (git-abcdef) on Windows 10".parse().unwrap();
        assert_eq!(
            p,
            RelayPlatform::Tor("0.4.8.9".parse().unwrap(), "Windows 10".into())
        );
        let p: RelayPlatform = "Arti 1.0".parse().unwrap();
        assert_eq!(p, RelayPlatform::Other("Arti 1.0".into()));
        assert!("Tor banana on Linux".parse::<RelayPlatform>().is_err());
    }
}
