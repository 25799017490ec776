//! Implements the relay 'family' type.

use crate::parse::tokenize::is_sp;
use crate::types::misc::{is_nickname, LongIdent, RsaIdentity};
use crate::{Error, Pos, Result};
use std::fmt;

/// One member of a relay's declared family.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FamilyMember {
    /// A member named only by its nickname.
    Nickname(String),
    /// A member named by its identity, as `$HEX`.
    ///
    /// The second field holds a trailing `=name` or `~name` suffix,
    /// separator included, if there was one.
    Identity(RsaIdentity, Option<String>),
}

impl fmt::Display for FamilyMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FamilyMember::Nickname(n) => write!(f, "{}", n),
            FamilyMember::Identity(id, suffix) => {
                write!(f, "{}{}", id, suffix.as_deref().unwrap_or(""))
            }
        }
    }
}

impl std::str::FromStr for FamilyMember {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with('$') {
            let ident: RsaIdentity = s.parse::<LongIdent>()?.into();
            let suffix = match s.find(|ch| ch == '=' || ch == '~') {
                Some(idx) if is_nickname(&s[idx + 1..]) => Some(s[idx..].to_string()),
                Some(idx) => {
                    return Err(Error::BadArgument(
                        None,
                        Pos::at(&s[idx..]),
                        "invalid nickname after identity".into(),
                    ))
                }
                None => None,
            };
            Ok(FamilyMember::Identity(ident, suffix))
        } else if is_nickname(s) {
            Ok(FamilyMember::Nickname(s.to_string()))
        } else {
            Err(Error::BadArgument(
                None,
                Pos::at(s),
                "family member is neither a nickname nor an identity".into(),
            ))
        }
    }
}

/// Information about a relay family.
///
/// Tor relays may declare that they belong to the same family, to
/// indicate that they are controlled by the same party or parties,
/// and as such should not be used in the same circuit. Two relays
/// belong to the same family if and only if each one lists the other
/// as belonging to its family.
///
/// Members are kept in the order they were listed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayFamily(Vec<FamilyMember>);

impl RelayFamily {
    /// Return a new empty RelayFamily.
    pub fn new() -> Self {
        RelayFamily(Vec::new())
    }
    /// Return the members of this family, in order.
    pub fn members(&self) -> &[FamilyMember] {
        &self.0[..]
    }
    /// Return true if this family has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Add every member of `other` to the end of this family.
    pub fn extend(&mut self, other: RelayFamily) {
        self.0.extend(other.0)
    }
    /// Add a single member to the end of this family.
    pub fn push(&mut self, member: FamilyMember) {
        self.0.push(member)
    }
}

impl fmt::Display for RelayFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for m in self.0.iter() {
            write!(f, "{}{}", sep, m)?;
            sep = " ";
        }
        Ok(())
    }
}

impl std::str::FromStr for RelayFamily {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let v: Result<Vec<FamilyMember>> = s
            .split(is_sp)
            .filter(|e| !e.is_empty())
            .map(str::parse)
            .collect();
        Ok(RelayFamily(v?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn family() -> Result<()> {
        let fam: RelayFamily =
            "Ada $7467A97D19CD2B4F2BC0388AA99C5E67710F847E=fred $FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"
                .parse()?;
        let id = RsaIdentity::from(hex!("7467A97D19CD2B4F2BC0388AA99C5E67710F847E"));
        assert_eq!(
            fam.members(),
            &[
                FamilyMember::Nickname("Ada".into()),
                FamilyMember::Identity(id, Some("=fred".into())),
                FamilyMember::Identity(RsaIdentity::from([0xff; 20]), None),
            ]
        );
        assert_eq!(
            fam.to_string(),
            "Ada $7467A97D19CD2B4F2BC0388AA99C5E67710F847E=fred $FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"
        );

        let mut fam2: RelayFamily = "$7467A97D19CD2B4F2BC0388AA99C5E67710F847E~bob".parse()?;
        fam2.extend("Ada".parse()?);
        assert_eq!(fam2.members().len(), 2);
        assert_eq!(fam2.members()[1], FamilyMember::Nickname("Ada".into()));
        Ok(())
    }

    #[test]
    fn bad_family() {
        for s in &[
            "Ada,Bob",
            "$7467A97D19CD2B4F2BC0388AA99C5E67710F847",
            "$7467A97D19CD2B4F2BC0388AA99C5E67710F847E=",
            "$7467A97D19CD2B4F2BC0388AA99C5E67710F847E=bad-name",
            "averyveryverylongnickname",
        ] {
            assert!(s.parse::<RelayFamily>().is_err(), "{}", s);
        }
    }
}
