//! Helpers that don't belong anywhere else.

pub(crate) mod str;

use std::iter::Peekable;

/// An iterator that yields items from a `Peekable` until the next one
/// matches a predicate.
///
/// Unlike `take_while`, the matching item is left in the underlying
/// iterator, so the next stage of parsing can read it.
pub(crate) struct PauseAt<'a, I: Iterator, F: FnMut(&I::Item) -> bool> {
    /// Where the items come from.
    inner: &'a mut Peekable<I>,
    /// True for the item we should stop before.
    stop: F,
}

impl<'a, I: Iterator, F: FnMut(&I::Item) -> bool> PauseAt<'a, I, F> {
    /// Yield items from `inner` until one makes `stop` return true.
    pub(crate) fn from_peekable(inner: &'a mut Peekable<I>, stop: F) -> Self {
        PauseAt { inner, stop }
    }
}

impl<'a, I: Iterator, F: FnMut(&I::Item) -> bool> Iterator for PauseAt<'a, I, F> {
    type Item = I::Item;
    fn next(&mut self) -> Option<I::Item> {
        let stop = &mut self.stop;
        self.inner.next_if(|item| !stop(item))
    }
}

#[cfg(test)]
mod test {
    use super::PauseAt;

    #[test]
    fn pause_and_resume() {
        let mut words = "router a b router c router".split(' ').peekable();

        let first: Vec<_> = PauseAt::from_peekable(&mut words, |w| *w == "router").collect();
        assert!(first.is_empty());
        assert_eq!(words.next(), Some("router"));

        let body: Vec<_> = PauseAt::from_peekable(&mut words, |w| *w == "router").collect();
        assert_eq!(body, vec!["a", "b"]);
        assert_eq!(words.peek(), Some(&"router"));

        words.next();
        let rest: Vec<_> = PauseAt::from_peekable(&mut words, |w| w.len() > 1).collect();
        assert_eq!(rest, vec!["c"]);
        assert_eq!(words.collect::<Vec<_>>(), vec!["router"]);
    }

    #[test]
    fn never_paused() {
        let mut nums = (1..=4).peekable();
        let mut calls = 0;
        let sum: i32 = PauseAt::from_peekable(&mut nums, |_| {
            calls += 1;
            false
        })
        .sum();
        assert_eq!(sum, 10);
        assert_eq!(calls, 4);
        assert_eq!(nums.next(), None);
    }
}
