//! The legacy `protocols` entry.
//!
//! Old relays list the link and circuit protocol versions they speak
//! as `protocols Link 1 2 Circuit 1`.  Newer relays use the `proto`
//! entry instead, which we keep as text.

use crate::{Error, Pos, Result};
use std::fmt;

/// Link and circuit protocol versions from a `protocols` entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyProtocols {
    /// Supported link protocol versions, in the order listed.
    link: Vec<u16>,
    /// Supported circuit protocol versions, in the order listed.
    circuit: Vec<u16>,
}

impl LegacyProtocols {
    /// Construct a new LegacyProtocols from two lists of versions.
    pub fn new(link: Vec<u16>, circuit: Vec<u16>) -> Self {
        LegacyProtocols { link, circuit }
    }
    /// Return the link protocol versions.
    pub fn link(&self) -> &[u16] {
        &self.link[..]
    }
    /// Return the circuit protocol versions.
    pub fn circuit(&self) -> &[u16] {
        &self.circuit[..]
    }
}

impl fmt::Display for LegacyProtocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link")?;
        for v in &self.link {
            write!(f, " {}", v)?;
        }
        write!(f, " Circuit")?;
        for v in &self.circuit {
            write!(f, " {}", v)?;
        }
        Ok(())
    }
}

/// Parse a run of version numbers.
fn versions<'a>(words: impl Iterator<Item = &'a str>) -> Result<Vec<u16>> {
    words
        .map(|w| {
            w.parse::<u16>().map_err(|e| {
                Error::BadArgument(None, Pos::at(w), format!("bad protocol version: {}", e))
            })
        })
        .collect()
}

impl std::str::FromStr for LegacyProtocols {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let words: Vec<&str> = s
            .split(crate::parse::tokenize::is_sp)
            .filter(|w| !w.is_empty())
            .collect();
        let circ_idx = words.iter().position(|w| *w == "Circuit");
        match (words.first(), circ_idx) {
            (Some(&"Link"), Some(idx)) => Ok(LegacyProtocols {
                link: versions(words[1..idx].iter().copied())?,
                circuit: versions(words[idx + 1..].iter().copied())?,
            }),
            _ => Err(Error::BadArgument(
                None,
                Pos::at(s),
                "expected \"Link ... Circuit ...\"".into(),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() -> Result<()> {
        let p: LegacyProtocols = "Link 1 2 Circuit 1".parse()?;
        assert_eq!(p.link(), &[1, 2]);
        assert_eq!(p.circuit(), &[1]);
        assert_eq!(p.to_string(), "Link 1 2 Circuit 1");

        let p: LegacyProtocols = "Link Circuit".parse()?;
        assert_eq!(p, LegacyProtocols::default());

        assert!("Circuit 1 Link 1".parse::<LegacyProtocols>().is_err());
        assert!("Link 1 2".parse::<LegacyProtocols>().is_err());
        assert!("Link 1 x Circuit 1".parse::<LegacyProtocols>().is_err());
        assert!("Link 1 Circuit 99999".parse::<LegacyProtocols>().is_err());
        Ok(())
    }
}
