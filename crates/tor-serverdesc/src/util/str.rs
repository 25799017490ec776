//! Offsets of string slices and lines.

/// Return the byte offset of `part` within `whole`, if `part` is a
/// slice of `whole`.
///
/// This compares addresses, not contents: an equal string stored
/// elsewhere is not "within" `whole`.
pub(crate) fn str_offset(whole: &str, part: &str) -> Option<usize> {
    let whole_start = whole.as_ptr() as usize;
    let part_start = part.as_ptr() as usize;
    let off = part_start.checked_sub(whole_start)?;
    if off + part.len() <= whole.len() {
        Some(off)
    } else {
        None
    }
}

/// Return the offset of the start of the line containing byte `off`
/// of `s`.
pub(crate) fn line_start(s: &str, off: usize) -> usize {
    s.as_bytes()[..off]
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |nl| nl + 1)
}

/// Return the offset just past the newline that ends the line
/// containing byte `off` of `s`, or the length of `s` if that line
/// has no newline.
pub(crate) fn line_end(s: &str, off: usize) -> usize {
    s.as_bytes()[off..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(s.len(), |nl| off + nl + 1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offsets() {
        let desc = "router Unnamed 10.0.0.1 9001 0 0 0\n";
        let nick = &desc[7..14];
        assert_eq!(nick, "Unnamed");
        assert_eq!(str_offset(desc, nick), Some(7));
        assert_eq!(str_offset(desc, &desc[35..]), Some(35));
        assert_eq!(str_offset(&desc[10..], nick), None);
        assert_eq!(str_offset(&desc[..10], nick), None);

        let copy = String::from("Unnamed");
        assert_eq!(str_offset(desc, &copy), None);
    }

    #[test]
    fn lines() {
        let s = "router x\nuptime 5\r\nplatform";
        assert_eq!(line_start(s, 0), 0);
        assert_eq!(line_start(s, 5), 0);
        assert_eq!(line_start(s, 9), 9);
        assert_eq!(line_start(s, 12), 9);
        assert_eq!(line_end(s, 0), 9);
        assert_eq!(line_end(s, 9), 19);
        assert_eq!(line_end(s, 20), s.len());
    }
}
