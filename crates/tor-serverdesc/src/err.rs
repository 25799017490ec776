//! Error type from parsing a server descriptor, along with the
//! position type used to say where things went wrong.

use crate::types::policy::PolicyError;
use std::fmt;
use thiserror::Error;

/// A position within a server descriptor buffer. Used to tell where an
/// error occurred.
///
/// Positions start out as addresses within the buffer being parsed
/// (`Raw`) or as byte offsets (`Byte`); [`Pos::within`] turns them into
/// line-and-byte positions once the containing buffer is known.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Pos {
    /// The error did not occur at any particular position.
    None,
    /// The error occurred at an unknown position.
    Unknown,
    /// The error was at an offset that is not a character boundary.
    Invalid(usize),
    /// The error occurred at a given byte offset in the buffer.
    Byte {
        /// Offset, in bytes, from the start of the buffer.
        off: usize,
    },
    /// The error occurred at a given line and byte within that line.
    PosInLine {
        /// Line number, counting from 1.
        line: usize,
        /// Byte within the line, counting from 1.
        byte: usize,
    },
    /// The error occurred at a memory address that has not yet been
    /// resolved against its containing buffer.
    Raw {
        /// Address of the byte where the error occurred.
        ptr: usize,
    },
}

impl Pos {
    /// Construct a Pos from an offset within a string.
    pub fn from_offset(s: &str, off: usize) -> Self {
        if off > s.len() || !s.is_char_boundary(off) {
            return Pos::Invalid(off);
        }
        let s = &s[..off];
        match s.rfind('\n') {
            Some(nl) => {
                let newlines = s.bytes().filter(|b| *b == b'\n').count();
                Pos::PosInLine {
                    line: newlines + 1,
                    byte: off - nl,
                }
            }
            None => Pos::PosInLine {
                line: 1,
                byte: off + 1,
            },
        }
    }
    /// Construct a Pos for the start of `s`.
    ///
    /// The result only becomes meaningful after a call to
    /// [`Pos::within`] with the buffer that `s` was sliced from.
    pub(crate) fn at(s: &str) -> Self {
        Pos::Raw {
            ptr: s.as_ptr() as usize,
        }
    }
    /// Construct a Pos for the first byte after the end of `s`.
    pub(crate) fn at_end_of(s: &str) -> Self {
        Pos::Raw {
            ptr: s.as_ptr() as usize + s.len(),
        }
    }
    /// Construct a Pos from a byte offset.
    pub fn from_byte(off: usize) -> Self {
        Pos::Byte { off }
    }
    /// Construct a Pos from a line number and byte within the line.
    pub fn from_line(line: usize, byte: usize) -> Self {
        Pos::PosInLine { line, byte }
    }
    /// If this position falls within `s`, return its offset in bytes.
    pub(crate) fn offset_within(&self, s: &str) -> Option<usize> {
        match self {
            Pos::Byte { off } => Some(*off),
            Pos::Raw { ptr } => {
                let start = s.as_ptr() as usize;
                if start <= *ptr && *ptr <= start + s.len() {
                    Some(*ptr - start)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
    /// Resolve this position against the buffer `s` it came from.
    ///
    /// Positions that are already line-based, or that do not point
    /// into `s`, are returned unchanged.
    pub fn within(self, s: &str) -> Self {
        match self.offset_within(s) {
            Some(off) => Self::from_offset(s, off),
            None => self,
        }
    }
    /// Return the line number of this position, if it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Pos::PosInLine { line, .. } => Some(*line),
            _ => None,
        }
    }
    /// Return true if this position tells us something.
    fn is_known(&self) -> bool {
        !matches!(self, Pos::None | Pos::Unknown)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Pos::*;
        match self {
            None => write!(f, ""),
            Unknown => write!(f, " at unknown position"),
            Invalid(off) => write!(f, " at invalid offset at index {}", off),
            Byte { off } => write!(f, " at byte {}", off),
            PosInLine { line, byte } => write!(f, " on line {}, byte {}", line, byte),
            Raw { .. } => write!(f, " at unresolved position"),
        }
    }
}

/// The broad category of a parse [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The text could not be split into well-formed lines and objects.
    Lex,
    /// A recognized entry had arguments or an object that violate its
    /// grammar.
    FieldFormat,
    /// Entries appeared in the wrong order, the wrong number of times,
    /// or where no descriptor entry was expected.
    Structure,
    /// A complete descriptor was missing a mandatory entry or had an
    /// unacceptable value.
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::FieldFormat => "field format error",
            ErrorKind::Structure => "structure error",
            ErrorKind::Validation => "validation error",
        };
        write!(f, "{}", s)
    }
}

/// Helper for error messages: name the keyword, if we know it.
fn kwd_name(k: &Option<&'static str>) -> &'static str {
    k.unwrap_or("entry")
}

/// An error that occurred while parsing a server descriptor.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// An internal error in the parser: these should never happen.
    #[error("internal error{0}")]
    Internal(Pos),
    /// An entry was found with no newline at the end.
    #[error("line truncated before newline{0}")]
    TruncatedLine(Pos),
    /// A bad string was found in the keyword position.
    #[error("invalid keyword{0}")]
    BadKeyword(Pos),
    /// We found an ill-formed "BEGIN FOO" tag.
    #[error("invalid PEM BEGIN tag{0}")]
    BadObjectBeginTag(Pos),
    /// We found an ill-formed "END FOO" tag.
    #[error("invalid PEM END tag{0}")]
    BadObjectEndTag(Pos),
    /// We found a "BEGIN FOO" tag with an "END BAR" tag.
    #[error("mismatched PEM tags{0}")]
    BadObjectMismatchedTag(Pos),
    /// We found a base64 object with an invalid base64 encoding.
    #[error("invalid base64 in object{0}")]
    BadObjectBase64(Pos),
    /// The buffer ended inside an object.
    #[error("object not terminated before end of input{0}")]
    UnterminatedObject(Pos),
    /// The buffer was not valid UTF-8.
    #[error("invalid UTF-8{0}")]
    BadUtf8(Pos),
    /// The document contained a keyword more times than it may.
    #[error("duplicate entry for {0}{1}")]
    DuplicateToken(&'static str, Pos),
    /// The document contained an entry that can't appear here.
    #[error("entry {0} unexpected{1}")]
    UnexpectedToken(&'static str, Pos),
    /// The document contained an entry in the wrong place.
    #[error("entry {0} misplaced{1}")]
    MisplacedToken(&'static str, Pos),
    /// An annotation declared a document type that we don't handle.
    #[error("unsupported document type{0}")]
    BadDocumentType(Pos),
    /// The document is missing a required entry.
    #[error("didn't find required entry {0}{1}")]
    MissingToken(&'static str, Pos),
    /// An entry had too many arguments.
    #[error("too many arguments for {0}{1}")]
    TooManyArguments(&'static str, Pos),
    /// An entry had too few arguments.
    #[error("too few arguments for {0}{1}")]
    TooFewArguments(&'static str, Pos),
    /// An entry had an object that it isn't allowed to have.
    #[error("unexpected object for {0}{1}")]
    UnexpectedObject(&'static str, Pos),
    /// An entry was missing an object that it needs.
    #[error("missing object for {0}{1}")]
    MissingObject(&'static str, Pos),
    /// An entry had an object of the wrong type.
    #[error("wrong object type for {}{}", kwd_name(.0), .1)]
    WrongObject(Option<&'static str>, Pos),
    /// An entry was missing an argument that it needs.
    #[error("missing argument for {}{}", kwd_name(.0), .1)]
    MissingArgument(Option<&'static str>, Pos),
    /// An entry had an argument that didn't match its grammar.
    #[error("bad argument for {}{}: {}", kwd_name(.0), .1, .2)]
    BadArgument(Option<&'static str>, Pos, String),
    /// A Tor version string could not be parsed.
    #[error("couldn't parse Tor version{0}")]
    BadTorVersion(Pos),
    /// An exit policy entry could not be parsed.
    #[error("invalid policy entry for {}{}: {}", kwd_name(.0), .1, .2)]
    BadPolicy(Option<&'static str>, Pos, #[source] PolicyError),
    /// A well-formed value was not acceptable.
    #[error("invalid value for {0}{1}: {2}")]
    InvalidValue(&'static str, Pos, String),
    /// A builder was asked to encode a descriptor without a field it needs.
    #[error("cannot build descriptor: {0}")]
    CannotBuild(&'static str),
}

impl Error {
    /// Return a reference to the position of this error, if it has one.
    fn pos_ref(&self) -> Option<&Pos> {
        use Error::*;
        match self {
            Internal(p)
            | TruncatedLine(p)
            | BadKeyword(p)
            | BadObjectBeginTag(p)
            | BadObjectEndTag(p)
            | BadObjectMismatchedTag(p)
            | BadObjectBase64(p)
            | UnterminatedObject(p)
            | BadUtf8(p)
            | DuplicateToken(_, p)
            | UnexpectedToken(_, p)
            | MisplacedToken(_, p)
            | BadDocumentType(p)
            | MissingToken(_, p)
            | TooManyArguments(_, p)
            | TooFewArguments(_, p)
            | UnexpectedObject(_, p)
            | MissingObject(_, p)
            | WrongObject(_, p)
            | MissingArgument(_, p)
            | BadArgument(_, p, _)
            | BadTorVersion(p)
            | BadPolicy(_, p, _)
            | InvalidValue(_, p, _) => Some(p),
            CannotBuild(_) => None,
        }
    }
    /// Return a mutable reference to the position of this error, if it has one.
    fn pos_mut(&mut self) -> Option<&mut Pos> {
        use Error::*;
        match self {
            Internal(p)
            | TruncatedLine(p)
            | BadKeyword(p)
            | BadObjectBeginTag(p)
            | BadObjectEndTag(p)
            | BadObjectMismatchedTag(p)
            | BadObjectBase64(p)
            | UnterminatedObject(p)
            | BadUtf8(p)
            | DuplicateToken(_, p)
            | UnexpectedToken(_, p)
            | MisplacedToken(_, p)
            | BadDocumentType(p)
            | MissingToken(_, p)
            | TooManyArguments(_, p)
            | TooFewArguments(_, p)
            | UnexpectedObject(_, p)
            | MissingObject(_, p)
            | WrongObject(_, p)
            | MissingArgument(_, p)
            | BadArgument(_, p, _)
            | BadTorVersion(p)
            | BadPolicy(_, p, _)
            | InvalidValue(_, p, _) => Some(p),
            CannotBuild(_) => None,
        }
    }

    /// Return the position of this error.
    pub fn pos(&self) -> Pos {
        self.pos_ref().copied().unwrap_or(Pos::None)
    }

    /// Return the line of the buffer where this error occurred, if known.
    pub fn line(&self) -> Option<usize> {
        self.pos().line()
    }

    /// Return the category of this error.
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            Internal(_)
            | TruncatedLine(_)
            | BadKeyword(_)
            | BadObjectBeginTag(_)
            | BadObjectEndTag(_)
            | BadObjectMismatchedTag(_)
            | BadObjectBase64(_)
            | UnterminatedObject(_)
            | BadUtf8(_) => ErrorKind::Lex,
            TooManyArguments(..)
            | TooFewArguments(..)
            | UnexpectedObject(..)
            | MissingObject(..)
            | WrongObject(..)
            | MissingArgument(..)
            | BadArgument(..)
            | BadTorVersion(_)
            | BadPolicy(..) => ErrorKind::FieldFormat,
            DuplicateToken(..) | UnexpectedToken(..) | MisplacedToken(..) | BadDocumentType(_) => {
                ErrorKind::Structure
            }
            MissingToken(..) | InvalidValue(..) | CannotBuild(_) => ErrorKind::Validation,
        }
    }

    /// Return the keyword that this error concerns, if we know it.
    pub fn keyword(&self) -> Option<&'static str> {
        use Error::*;
        match self {
            DuplicateToken(k, _)
            | UnexpectedToken(k, _)
            | MisplacedToken(k, _)
            | MissingToken(k, _)
            | TooManyArguments(k, _)
            | TooFewArguments(k, _)
            | UnexpectedObject(k, _)
            | MissingObject(k, _)
            | InvalidValue(k, _, _) => Some(k),
            WrongObject(k, _)
            | MissingArgument(k, _)
            | BadArgument(k, _, _)
            | BadPolicy(k, _, _) => *k,
            _ => None,
        }
    }

    /// Resolve the position of this error against the buffer `s` that
    /// was being parsed.
    pub fn within(mut self, s: &str) -> Error {
        if let Some(p) = self.pos_mut() {
            *p = p.within(s);
        }
        self
    }

    /// Return a new error based on this one, with its position
    /// replaced by `pos`.
    pub(crate) fn at_pos(mut self, pos: Pos) -> Error {
        if let Some(p) = self.pos_mut() {
            *p = pos;
        }
        self
    }

    /// Return a new error based on this one, with its position
    /// replaced by `pos` unless it already has a known position.
    pub(crate) fn or_at_pos(mut self, pos: Pos) -> Error {
        if let Some(p) = self.pos_mut() {
            if !p.is_known() {
                *p = pos;
            }
        }
        self
    }

    /// Return a new error based on this one, naming `kwd` as the
    /// keyword it concerns if it didn't name one already.
    pub(crate) fn in_keyword(mut self, kwd: &'static str) -> Error {
        use Error::*;
        match &mut self {
            WrongObject(k, _)
            | MissingArgument(k, _)
            | BadArgument(k, _, _)
            | BadPolicy(k, _, _) => {
                if k.is_none() {
                    *k = Some(kwd);
                }
            }
            _ => (),
        }
        self
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Error {
        Error::BadArgument(None, Pos::Unknown, e.to_string())
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Error {
        Error::BadArgument(None, Pos::Unknown, e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn positions() {
        let s = "router a\nbandwidth 1 2 3\n\nfingerprint\n";
        assert_eq!(Pos::from_offset(s, 0), Pos::from_line(1, 1));
        assert_eq!(Pos::from_offset(s, 7), Pos::from_line(1, 8));
        assert_eq!(Pos::from_offset(s, 9), Pos::from_line(2, 1));
        assert_eq!(Pos::from_offset(s, 19), Pos::from_line(2, 11));
        assert_eq!(Pos::from_offset(s, 26), Pos::from_line(4, 1));
        assert_eq!(Pos::from_offset(s, 999), Pos::Invalid(999));

        assert_eq!(Pos::at(&s[9..]).within(s), Pos::from_line(2, 1));
        assert_eq!(Pos::at_end_of(&s[..8]).within(s), Pos::from_line(1, 9));
        assert_eq!(Pos::from_byte(9).within(s), Pos::from_line(2, 1));
        // Not part of the buffer: left alone.
        let other = String::from("elsewhere");
        assert!(matches!(Pos::at(&other).within(s), Pos::Raw { .. }));
        assert_eq!(Pos::None.within(s), Pos::None);

        assert_eq!(Pos::from_line(4, 1).line(), Some(4));
        assert_eq!(Pos::Unknown.line(), None);
    }

    #[test]
    fn display() {
        assert_eq!(
            Error::DuplicateToken("bandwidth", Pos::from_line(5, 1)).to_string(),
            "duplicate entry for bandwidth on line 5, byte 1"
        );
        assert_eq!(
            Error::BadArgument(Some("uptime"), Pos::from_line(3, 8), "not a number".into())
                .to_string(),
            "bad argument for uptime on line 3, byte 8: not a number"
        );
        assert_eq!(
            Error::MissingArgument(None, Pos::None).to_string(),
            "missing argument for entry"
        );
        assert_eq!(
            Error::MissingToken("onion-key", Pos::None).to_string(),
            "didn't find required entry onion-key"
        );
    }

    #[test]
    fn kinds_and_keywords() {
        let e = Error::UnterminatedObject(Pos::from_line(9, 1));
        assert_eq!(e.kind(), ErrorKind::Lex);
        assert_eq!(e.line(), Some(9));
        assert_eq!(e.keyword(), None);

        let e = Error::BadArgument(None, Pos::Unknown, "x".into()).in_keyword("published");
        assert_eq!(e.kind(), ErrorKind::FieldFormat);
        assert_eq!(e.keyword(), Some("published"));
        // An existing keyword wins.
        let e = e.in_keyword("uptime");
        assert_eq!(e.keyword(), Some("published"));

        let e = Error::DuplicateToken("bandwidth", Pos::Unknown);
        assert_eq!(e.kind(), ErrorKind::Structure);
        let e = Error::MissingToken("signing-key", Pos::None);
        assert_eq!(e.kind(), ErrorKind::Validation);
        assert_eq!(ErrorKind::Validation.to_string(), "validation error");
    }

    #[test]
    fn relocate() {
        let e = Error::BadObjectBase64(Pos::Unknown).or_at_pos(Pos::from_line(2, 1));
        assert_eq!(e.pos(), Pos::from_line(2, 1));
        let e = e.or_at_pos(Pos::from_line(3, 1));
        assert_eq!(e.pos(), Pos::from_line(2, 1));
        let e = e.at_pos(Pos::from_line(3, 1));
        assert_eq!(e.pos(), Pos::from_line(3, 1));
    }
}
