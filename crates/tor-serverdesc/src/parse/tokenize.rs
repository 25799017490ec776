//! Split a document into entries.
//!
//! Each entry (an `Item`) is one keyword line, plus the PEM-style
//! object that follows it, if any.  `NetDocReader` yields entries one
//! at a time, and never needs more than one line of lookahead.
//!
//! Items borrow from the document; nothing here copies text.

use crate::parse::keyword::Keyword;
use crate::util::PauseAt;
use crate::{Error, Pos, Result};

use std::iter::Peekable;
use std::str::FromStr;

/// Return true if `c` is a space, as dir-spec.txt counts them.
pub(crate) fn is_sp(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Start of a line that opens an object.
const BEGIN: &str = "-----BEGIN ";
/// Start of a line that closes an object.
const END: &str = "-----END ";
/// End of both kinds of marker line.
const DASHES: &str = "-----";

/// Return true if `line` holds nothing but base64 characters.
///
/// This doesn't prove that the line decodes; it lets us stop early
/// when an object is missing its END line.
fn is_base64_line(line: &str) -> bool {
    line.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// Return true if `s` is a valid keyword.  Annotations (starting with
/// `@`) are valid only if `annotation_ok` is true.
fn keyword_ok(s: &str, annotation_ok: bool) -> bool {
    let s = match s.strip_prefix('@') {
        Some(rest) if annotation_ok => rest,
        _ => s,
    };
    !s.is_empty()
        && !s.starts_with('-')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// If `line` is a marker line starting with `prefix`, return its tag.
fn marker_tag<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix(DASHES)
}

/// A byte cursor over a document.
#[derive(Clone, Debug)]
struct Cursor<'a> {
    /// The whole document.
    s: &'a str,
    /// Offset of the next unread byte.
    off: usize,
}

impl<'a> Cursor<'a> {
    /// Return the unread part of the document.
    fn rest(&self) -> &'a str {
        &self.s[self.off..]
    }
    /// Return true if there is nothing left to read.
    fn at_end(&self) -> bool {
        self.off >= self.s.len()
    }
    /// Return a line-based position for byte `off` of the document.
    fn pos_of(&self, off: usize) -> Pos {
        Pos::from_offset(self.s, off)
    }

    /// Take the next line, without its newline or trailing CR.  Return
    /// the offset where it began, too.
    ///
    /// A final line with no newline is an error; it is consumed anyway.
    fn take_line(&mut self) -> Result<(usize, &'a str)> {
        let start = self.off;
        let rest = self.rest();
        match rest.find('\n') {
            Some(nl) => {
                self.off += nl + 1;
                let line = &rest[..nl];
                Ok((start, line.strip_suffix('\r').unwrap_or(line)))
            }
            None => {
                self.off = self.s.len();
                Err(Error::TruncatedLine(self.pos_of(self.s.len())))
            }
        }
    }

    /// Move past any lines that hold nothing but whitespace.
    fn skip_blank_lines(&mut self) {
        while !self.at_end() {
            let rest = self.rest();
            let len = rest.find('\n').map_or(rest.len(), |nl| nl + 1);
            if !rest[..len].chars().all(|c| is_sp(c) || c == '\r' || c == '\n') {
                break;
            }
            self.off += len;
        }
    }

    /// Take a keyword line, and split it into keyword and arguments.
    ///
    /// The legacy `opt ` prefix is dropped; it may not come before an
    /// annotation.
    fn keyword_line(&mut self) -> Result<(&'a str, &'a str)> {
        let (start, line) = self.take_line()?;
        let (line, annotation_ok) = match line.strip_prefix("opt ") {
            Some(rest) => (rest, false),
            None => (line, true),
        };
        let (kwd, args) = match line.find(is_sp) {
            Some(sp) => (&line[..sp], line[sp + 1..].trim_matches(is_sp)),
            // An empty slice that still points into the document.
            None => (line, &line[line.len()..]),
        };
        if keyword_ok(kwd, annotation_ok) {
            Ok((kwd, args))
        } else {
            Err(Error::BadKeyword(self.pos_of(start)))
        }
    }

    /// Read the next entry, or return None at the end of the document.
    ///
    /// Consumes at least one line unless the document is exhausted.
    fn item<K: Keyword>(&mut self) -> Result<Option<Item<'a, K>>> {
        self.skip_blank_lines();
        if self.at_end() {
            return Ok(None);
        }
        let (kwd_str, args) = self.keyword_line()?;
        let object = PemBlock::read(self)?;
        Ok(Some(Item {
            kwd: K::from_str(kwd_str),
            kwd_str,
            args,
            split_args: args.split(is_sp).filter(|a| !a.is_empty()).collect(),
            object,
        }))
    }
}

/// An object between `-----BEGIN TAG-----` and `-----END TAG-----`
/// lines.  Its body is not decoded until someone asks for it.
#[derive(Clone, Copy, Debug)]
struct PemBlock<'a> {
    /// The tag from the BEGIN line.
    tag: &'a str,
    /// The lines between the markers, newlines included.
    body: &'a str,
    /// The END line.
    end_line: &'a str,
}

impl<'a> PemBlock<'a> {
    /// Read an object from `cur`, if one starts there.
    ///
    /// A line that is neither base64 nor an END line stops the object
    /// with an error, and is left unread so that the next entry can
    /// still be found.
    fn read(cur: &mut Cursor<'a>) -> Result<Option<Self>> {
        if !cur.rest().starts_with(BEGIN) {
            return Ok(None);
        }
        let (begin_off, begin_line) = cur.take_line()?;
        let tag = marker_tag(begin_line, BEGIN)
            .filter(|t| t.split(' ').all(|w| keyword_ok(w, false)))
            .ok_or_else(|| Error::BadObjectBeginTag(cur.pos_of(begin_off)))?;

        let body_start = cur.off;
        loop {
            if cur.at_end() {
                return Err(Error::UnterminatedObject(cur.pos_of(begin_off)));
            }
            let (off, line) = match cur.take_line() {
                Ok(l) => l,
                Err(_) => return Err(Error::UnterminatedObject(cur.pos_of(begin_off))),
            };
            if line.starts_with(END) {
                return match marker_tag(line, END) {
                    None => Err(Error::BadObjectEndTag(cur.pos_of(off))),
                    Some(end_tag) if end_tag != tag => {
                        Err(Error::BadObjectMismatchedTag(cur.pos_of(off)))
                    }
                    Some(_) => Ok(Some(PemBlock {
                        tag,
                        body: &cur.s[body_start..off],
                        end_line: line,
                    })),
                };
            }
            if !is_base64_line(line) {
                cur.off = off;
                return Err(Error::BadObjectBase64(Pos::at(line)));
            }
        }
    }

    /// Decode the body of this object.
    fn decode(&self) -> Result<Vec<u8>> {
        let joined: String = self.body.lines().collect();
        base64::decode(&joined).map_err(|_| Error::BadObjectBase64(Pos::at(self.body)))
    }
}

/// One entry in a document: a keyword line, and maybe an object.
#[derive(Clone, Debug)]
pub(crate) struct Item<'a, K: Keyword> {
    /// What kind of entry this is.
    kwd: K,
    /// The keyword as written.
    kwd_str: &'a str,
    /// Everything after the keyword, with surrounding spaces removed.
    args: &'a str,
    /// The arguments, split on spaces.
    split_args: Vec<&'a str>,
    /// The object after this line, if any.
    object: Option<PemBlock<'a>>,
}

impl<'a, K: Keyword> Item<'a, K> {
    /// Return the keyword of this entry.
    pub(crate) fn kwd(&self) -> K {
        self.kwd
    }
    /// Return the keyword as it was written.
    pub(crate) fn kwd_str(&self) -> &'a str {
        self.kwd_str
    }
    /// Return all the arguments as one string.
    pub(crate) fn args_as_str(&self) -> &'a str {
        self.args
    }
    /// Return an iterator over the arguments.
    pub(crate) fn args(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.split_args.iter().copied()
    }
    /// Return how many arguments there are.
    pub(crate) fn n_args(&self) -> usize {
        self.split_args.len()
    }
    /// Return argument `idx`, if there is one.
    pub(crate) fn arg(&self, idx: usize) -> Option<&'a str> {
        self.split_args.get(idx).copied()
    }
    /// Return argument `idx`, or an error if there isn't one.
    pub(crate) fn required_arg(&self, idx: usize) -> Result<&'a str> {
        self.arg(idx)
            .ok_or_else(|| Error::MissingArgument(None, self.arg_pos(idx)))
    }
    /// Parse argument `idx` with `FromStr`.
    pub(crate) fn parse_arg<V: FromStr>(&self, idx: usize) -> Result<V>
    where
        Error: From<V::Err>,
    {
        let arg = self.required_arg(idx)?;
        arg.parse()
            .map_err(|e| Error::from(e).or_at_pos(Pos::at(arg)))
    }

    /// Return true if this entry has an object.
    pub(crate) fn has_obj(&self) -> bool {
        self.object.is_some()
    }
    /// Decode this entry's object, if it has one, and return its tag
    /// along with its contents.
    pub(crate) fn obj_raw(&self) -> Result<Option<(&'a str, Vec<u8>)>> {
        self.object
            .map(|o| Ok((o.tag, o.decode()?)))
            .transpose()
    }
    /// Decode this entry's object, which must have the tag `want_tag`.
    pub(crate) fn obj(&self, want_tag: &str) -> Result<Vec<u8>> {
        let o = self
            .object
            .ok_or_else(|| Error::MissingObject(self.kwd.to_str(), self.end_pos()))?;
        if o.tag != want_tag {
            return Err(Error::WrongObject(None, Pos::at(o.tag)));
        }
        o.decode()
    }

    /// Return the position of this entry.
    ///
    /// Like every position made from a slice, it only becomes a line
    /// number once it is resolved against the whole document.
    pub(crate) fn pos(&self) -> Pos {
        Pos::at(self.kwd_str)
    }
    /// Return the byte offset of this entry within `s`, if it is part
    /// of `s`.
    pub(crate) fn offset_in(&self, s: &str) -> Option<usize> {
        crate::util::str::str_offset(s, self.kwd_str)
    }
    /// Return the position of argument `n`, or of the end of the line
    /// if there is no such argument.
    pub(crate) fn arg_pos(&self, n: usize) -> Pos {
        match self.split_args.get(n) {
            Some(arg) => Pos::at(arg),
            None => self.line_end_pos(),
        }
    }
    /// Return the position just after the last argument.
    fn line_end_pos(&self) -> Pos {
        Pos::at_end_of(self.split_args.last().copied().unwrap_or(self.kwd_str))
    }
    /// Return the position of the end of this entry, after its object.
    fn end_pos(&self) -> Pos {
        match self.object {
            Some(o) => Pos::at_end_of(o.end_line),
            None => self.line_end_pos(),
        }
    }
}

/// Predicates on the results a `NetDocReader` yields, for use with
/// `pause_at`.
pub(crate) trait ItemResult<K: Keyword> {
    /// Return true if this is an entry that isn't an annotation.
    fn is_ok_with_non_annotation(&self) -> bool;
    /// Return true if this is an entry with one of the keywords in `ks`.
    fn is_ok_with_kwd_in(&self, ks: &[K]) -> bool;
}

impl<'a, K: Keyword> ItemResult<K> for Result<Item<'a, K>> {
    fn is_ok_with_non_annotation(&self) -> bool {
        matches!(self, Ok(item) if !item.kwd().is_annotation())
    }
    fn is_ok_with_kwd_in(&self, ks: &[K]) -> bool {
        matches!(self, Ok(item) if ks.contains(&item.kwd()))
    }
}

/// The iterator underneath a `NetDocReader`.
#[derive(Clone, Debug)]
struct Entries<'a, K: Keyword> {
    /// Where we are in the document.
    cur: Cursor<'a>,
    /// Marker for the keyword type we produce.
    _kwd: std::marker::PhantomData<K>,
}

impl<'a, K: Keyword> Iterator for Entries<'a, K> {
    type Item = Result<Item<'a, K>>;
    fn next(&mut self) -> Option<Self::Item> {
        self.cur.item().transpose()
    }
}

/// A peekable reader that yields the entries of a document one by one.
#[derive(Clone, Debug)]
pub(crate) struct NetDocReader<'a, K: Keyword> {
    /// The document.
    s: &'a str,
    /// The entries we haven't taken yet.
    tokens: Peekable<Entries<'a, K>>,
}

impl<'a, K: Keyword> NetDocReader<'a, K> {
    /// Make a reader for the entries in `s`.
    pub(crate) fn new(s: &'a str) -> Self {
        let entries = Entries {
            cur: Cursor { s, off: 0 },
            _kwd: std::marker::PhantomData,
        };
        NetDocReader {
            s,
            tokens: entries.peekable(),
        }
    }
    /// Return the document this reader reads.
    pub(crate) fn str(&self) -> &'a str {
        self.s
    }
    /// Return the underlying peekable iterator.
    pub(crate) fn iter(&mut self) -> &mut Peekable<impl Iterator<Item = Result<Item<'a, K>>>> {
        &mut self.tokens
    }
    /// Return an iterator that yields entries until it reaches one for
    /// which `f` is true, and leaves that one unread.
    pub(crate) fn pause_at<F>(
        &mut self,
        f: F,
    ) -> PauseAt<'_, impl Iterator<Item = Result<Item<'a, K>>>, F>
    where
        F: FnMut(&Result<Item<'a, K>>) -> bool,
    {
        PauseAt::from_peekable(&mut self.tokens, f)
    }
    /// Return an error if any entries remain.
    pub(crate) fn should_be_exhausted(&mut self) -> Result<()> {
        match self.tokens.peek() {
            None => Ok(()),
            Some(Ok(item)) => Err(Error::UnexpectedToken(item.kwd().to_str(), item.pos())),
            Some(Err(e)) => Err(e.clone()),
        }
    }
    /// Return the position of the next entry, or of the end of the
    /// document.
    ///
    /// Comparing this before and after an operation tells us whether
    /// the operation made progress.
    pub(crate) fn pos(&mut self) -> Pos {
        match self.tokens.peek() {
            Some(Ok(item)) => item.pos(),
            Some(Err(e)) => e.pos(),
            None => Pos::at_end_of(self.s),
        }
    }
}
