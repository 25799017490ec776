//! Small argument types shared by several server descriptor entries:
//! encoded byte strings, timestamps, fingerprints, and nicknames.
//!
//! Each one implements FromStr, so that `Item::parse_arg` can produce
//! it.  Only RsaIdentity is part of the public API.

pub(crate) use b16impl::*;
pub(crate) use b64impl::*;
pub use fingerprint::RsaIdentity;
pub(crate) use fingerprint::{LongIdent, SpFingerprint};
pub(crate) use nickname::is_nickname;
pub(crate) use timeimpl::*;

/// Base64 arguments.
mod b64impl {
    use crate::{Error, Pos, Result};
    use std::ops::RangeBounds;

    /// Bytes written as base64, with or without trailing `=`.
    pub(crate) struct B64(Vec<u8>);

    impl std::str::FromStr for B64 {
        type Err = Error;
        fn from_str(s: &str) -> Result<Self> {
            let bytes = base64::decode_config(s, base64::STANDARD_NO_PAD).map_err(|_| {
                Error::BadArgument(None, Pos::at(s), "invalid base64".into())
            })?;
            Ok(B64(bytes))
        }
    }

    impl B64 {
        /// Return the decoded bytes.
        pub(crate) fn as_bytes(&self) -> &[u8] {
            &self.0[..]
        }
        /// Give an error unless the number of decoded bytes is in
        /// `bounds`.
        pub(crate) fn check_len<B: RangeBounds<usize>>(self, bounds: B) -> Result<Self> {
            if bounds.contains(&self.0.len()) {
                Ok(self)
            } else {
                Err(Error::BadArgument(
                    None,
                    Pos::Unknown,
                    "invalid length on base64 data".to_string(),
                ))
            }
        }
        /// Return the decoded bytes as an array of exactly `N`.
        pub(crate) fn into_array<const N: usize>(self) -> Result<[u8; N]> {
            use std::convert::TryInto;
            let v = self.check_len(N..=N)?.0;
            v.try_into()
                .map_err(|_| Error::BadArgument(None, Pos::Unknown, "wrong length".into()))
        }
    }

    impl From<B64> for Vec<u8> {
        fn from(b: B64) -> Vec<u8> {
            b.0
        }
    }
}

/// Hexadecimal arguments.
mod b16impl {
    use crate::{Error, Pos, Result};

    /// Bytes written as hexadecimal, in either case.
    pub(crate) struct B16(Vec<u8>);

    impl std::str::FromStr for B16 {
        type Err = Error;
        fn from_str(s: &str) -> Result<Self> {
            let bytes = hex::decode(s).map_err(|_| {
                Error::BadArgument(None, Pos::at(s), "invalid hexadecimal".to_string())
            })?;
            Ok(B16(bytes))
        }
    }

    impl B16 {
        /// Return the decoded bytes.
        pub(crate) fn as_bytes(&self) -> &[u8] {
            &self.0[..]
        }
    }
}

/// Timestamps.
mod timeimpl {
    use crate::{Error, Pos, Result};
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use std::time::SystemTime;

    /// The layout of an Iso8601TimeSp: `d` is a digit, other characters
    /// must match exactly.
    const LAYOUT: &[u8; 19] = b"dddd-dd-dd dd:dd:dd";

    /// A UTC time written as `YYYY-MM-DD HH:MM:SS`, such as
    /// `2020-10-09 17:38:12`.
    ///
    /// Every field must have exactly the number of digits shown.
    pub(crate) struct Iso8601TimeSp(SystemTime);

    impl std::str::FromStr for Iso8601TimeSp {
        type Err = Error;
        fn from_str(s: &str) -> Result<Iso8601TimeSp> {
            let shape_ok = s.len() == LAYOUT.len()
                && s.bytes().zip(LAYOUT.iter()).all(|(c, l)| match l {
                    b'd' => c.is_ascii_digit(),
                    _ => c == *l,
                });
            if !shape_ok {
                return Err(Error::BadArgument(
                    None,
                    Pos::at(s),
                    "time must look like YYYY-MM-DD HH:MM:SS".into(),
                ));
            }
            let d = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map_err(|e| {
                Error::BadArgument(None, Pos::at(s), format!("invalid time: {}", e))
            })?;
            Ok(Iso8601TimeSp(Utc.from_utc_datetime(&d).into()))
        }
    }

    impl From<Iso8601TimeSp> for SystemTime {
        fn from(t: Iso8601TimeSp) -> SystemTime {
            t.0
        }
    }

    /// Format `t` the way Iso8601TimeSp expects to parse it.
    pub(crate) fn format_time_sp(t: SystemTime) -> String {
        let dt: DateTime<Utc> = t.into();
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Relay identity fingerprints.
mod fingerprint {
    use crate::{Error, Pos, Result};
    use std::fmt;

    /// The identity of a relay: a SHA1 digest of its DER-encoded RSA
    /// identity key.
    ///
    /// Computing this digest is up to the caller's crypto provider;
    /// this crate only parses and compares the 20-byte value.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct RsaIdentity([u8; 20]);

    impl RsaIdentity {
        /// Construct an RsaIdentity from a slice of bytes.
        ///
        /// Returns None if the slice is not exactly 20 bytes long.
        pub fn from_bytes(b: &[u8]) -> Option<Self> {
            use std::convert::TryInto;
            b.try_into().ok().map(RsaIdentity)
        }
        /// Return the bytes of this identity.
        pub fn as_bytes(&self) -> &[u8] {
            &self.0[..]
        }
        /// Format this identity the way a `fingerprint` entry does: upper
        /// case hex, with a space after every four characters.
        pub fn to_spaced(&self) -> String {
            let h = hex::encode_upper(self.0);
            let groups: Vec<&str> = (0..10).map(|i| &h[i * 4..i * 4 + 4]).collect();
            groups.join(" ")
        }
    }

    impl From<[u8; 20]> for RsaIdentity {
        fn from(b: [u8; 20]) -> RsaIdentity {
            RsaIdentity(b)
        }
    }

    impl fmt::Display for RsaIdentity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "${}", hex::encode_upper(self.0))
        }
    }

    impl fmt::Debug for RsaIdentity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "RsaIdentity {{ {} }}", self)
        }
    }

    /// An identity as a `fingerprint` entry writes it: ten groups of
    /// four hex digits, separated by single spaces.
    pub(crate) struct SpFingerprint(RsaIdentity);

    /// An identity as a `family` entry writes it: forty hex digits,
    /// optionally after a `$` and before a `=name` or `~name`.
    pub(crate) struct LongIdent(RsaIdentity);

    impl From<SpFingerprint> for RsaIdentity {
        fn from(SpFingerprint(id): SpFingerprint) -> RsaIdentity {
            id
        }
    }

    impl From<LongIdent> for RsaIdentity {
        fn from(LongIdent(id): LongIdent) -> RsaIdentity {
            id
        }
    }

    /// Parse exactly forty hex digits as an identity.
    fn parse_hex_ident(s: &str) -> Result<RsaIdentity> {
        if s.len() != 40 {
            return Err(Error::BadArgument(
                None,
                Pos::at(s),
                "wrong length on fingerprint".into(),
            ));
        }
        let bytes = hex::decode(s).map_err(|_| {
            Error::BadArgument(None, Pos::at(s), "invalid hexadecimal in fingerprint".into())
        })?;
        RsaIdentity::from_bytes(&bytes).ok_or_else(|| {
            Error::BadArgument(None, Pos::at(s), "wrong length on fingerprint".into())
        })
    }

    impl std::str::FromStr for SpFingerprint {
        type Err = Error;
        fn from_str(s: &str) -> Result<SpFingerprint> {
            let groups: Vec<&str> = s.split(' ').collect();
            let shape_ok = groups.len() == 10
                && groups
                    .iter()
                    .all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_hexdigit()));
            if !shape_ok {
                return Err(Error::BadArgument(
                    None,
                    Pos::at(s),
                    "fingerprint must be 10 groups of 4 hex digits".into(),
                ));
            }
            let ident = parse_hex_ident(&groups.concat()).map_err(|e| e.at_pos(Pos::at(s)))?;
            Ok(SpFingerprint(ident))
        }
    }

    impl std::str::FromStr for LongIdent {
        type Err = Error;
        fn from_str(s: &str) -> Result<LongIdent> {
            let s = s.strip_prefix('$').unwrap_or(s);
            let hex_part = s.split(|ch| ch == '=' || ch == '~').next().unwrap_or(s);
            parse_hex_ident(hex_part).map(LongIdent)
        }
    }
}

/// Relay nicknames.
mod nickname {
    /// Return true if `s` is a valid relay nickname: between 1 and 19
    /// ASCII letters and digits.
    pub(crate) fn is_nickname(s: &str) -> bool {
        (1..=19).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Result;
    use hex_literal::hex;

    #[test]
    fn base64() -> Result<()> {
        let padded: B64 = "b25pb24gcm91dGluZw==".parse()?;
        let unpadded: B64 = "b25pb24gcm91dGluZw".parse()?;
        assert_eq!(padded.as_bytes(), b"onion routing");
        assert_eq!(unpadded.as_bytes(), b"onion routing");
        assert!("b25p b24g".parse::<B64>().is_err());
        assert!("b".parse::<B64>().is_err());

        let b: B64 = "b25pb24gcm91dGluZw".parse()?;
        assert!(b.check_len(..=13).is_ok());
        let b: B64 = "b25pb24gcm91dGluZw".parse()?;
        assert!(b.check_len(14..).is_err());
        let arr: [u8; 13] = "b25pb24gcm91dGluZw".parse::<B64>()?.into_array()?;
        assert_eq!(&arr, b"onion routing");
        assert!("b25pb24gcm91dGluZw".parse::<B64>()?.into_array::<32>().is_err());
        Ok(())
    }

    #[test]
    fn base16() -> Result<()> {
        assert_eq!("72656c6179".parse::<B16>()?.as_bytes(), b"relay");
        assert_eq!("72656C6179".parse::<B16>()?.as_bytes(), b"relay");
        // Odd length, or not hex at all.
        assert!("72656c617".parse::<B16>().is_err());
        assert!("72656z6179".parse::<B16>().is_err());
        Ok(())
    }

    #[test]
    fn time() -> Result<()> {
        use std::time::{Duration, SystemTime};

        let t: SystemTime = "2014-12-16 12:54:02".parse::<Iso8601TimeSp>()?.into();
        assert_eq!(t, SystemTime::UNIX_EPOCH + Duration::from_secs(1418734442));
        assert_eq!(format_time_sp(t), "2014-12-16 12:54:02");

        for bad in &[
            "2014-12-16",
            "2014-12-16T12:54:02",
            "2014-12-16  12:54:02",
            "yesterday at noon",
            // Every field needs its full width.
            "2014-12-6 12:54:02",
            "2014-12-16 12:54:2",
            // Right shape, impossible time.
            "2014-02-30 12:54:02",
            "2014-12-16 25:54:02",
            "2014-13-16 12:54:02",
        ] {
            assert!(bad.parse::<Iso8601TimeSp>().is_err(), "{}", bad);
        }
        Ok(())
    }

    #[test]
    fn fingerprint() -> Result<()> {
        let id = RsaIdentity::from(hex!("DA4DEC93C8D2F187C027A96D3925C1531D90A89E"));
        let spaced = "DA4D EC93 C8D2 F187 C027 A96D 3925 C153 1D90 A89E";

        assert_eq!(RsaIdentity::from(spaced.parse::<SpFingerprint>()?), id);
        assert_eq!(id.to_spaced(), spaced);
        assert_eq!(id.to_string(), "$DA4DEC93C8D2F187C027A96D3925C1531D90A89E");
        assert_eq!(RsaIdentity::from_bytes(id.as_bytes()), Some(id));
        assert_eq!(RsaIdentity::from_bytes(&[0; 19]), None);

        for bad in &[
            "DA4DEC93C8D2F187C027A96D3925C1531D90A89E",
            "DA4D EC93",
            "DA4D  EC93 C8D2 F187 C027 A96D 3925 C153 1D90 A89E",
            "DA4D EC93 C8D2 F187 C027 A96D 3925 C153 1D90 A89",
            "DA4D EC93 C8D2 F187 C027 A96D 3925 C153 1D90 A89X",
            "DA4D EC93 C8D2 F187 C027 A96D 3925 C153 1D90 A89E ",
        ] {
            assert!(bad.parse::<SpFingerprint>().is_err(), "{}", bad);
        }

        for good in &[
            "DA4DEC93C8D2F187C027A96D3925C1531D90A89E",
            "$DA4DEC93C8D2F187C027A96D3925C1531D90A89E",
            "$da4dec93c8d2f187c027a96d3925c1531d90a89e~LetFreedomRing",
            "$DA4DEC93C8D2F187C027A96D3925C1531D90A89E=LetFreedomRing",
        ] {
            assert_eq!(RsaIdentity::from(good.parse::<LongIdent>()?), id);
        }
        assert!(spaced.parse::<LongIdent>().is_err());
        assert!("$DA4DEC93".parse::<LongIdent>().is_err());
        Ok(())
    }

    #[test]
    fn nicknames() {
        assert!(is_nickname("LetFreedomRing"));
        assert!(is_nickname("x"));
        assert!(is_nickname("abcdefghij123456789"));
        assert!(!is_nickname("abcdefghij1234567890"));
        assert!(!is_nickname(""));
        assert!(!is_nickname("bad-name"));
        assert!(!is_nickname("naïve"));
    }
}
