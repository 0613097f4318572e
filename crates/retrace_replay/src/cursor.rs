//! Bidirectional replay cursor.
//!
//! Wraps a lazy source and behaves like a list iterator: `next` and
//! `previous` walk an internal history, and `to_list` reads everything
//! without moving the cursor.

use std::collections::VecDeque;

/// Cursor over a lazily pulled source with lookahead and history
pub struct ReplayCursor<T> {
    source: Box<dyn Iterator<Item = T>>,
    /// Items pulled ahead of the cursor, oldest first
    ahead: VecDeque<T>,
    /// Items produced so far, oldest first
    history: Vec<T>,
    /// Steps taken back from the end of `history`
    back: usize,
}

impl<T: Clone + 'static> ReplayCursor<T> {
    /// Wrap a source
    #[must_use]
    pub fn new(source: impl Iterator<Item = T> + 'static) -> Self {
        Self {
            source: Box::new(source),
            ahead: VecDeque::new(),
            history: Vec::new(),
            back: 0,
        }
    }

    /// Cursor over a fixed list
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::new(items.into_iter())
    }

    /// Replace the source and forget all state
    pub fn reset_with(&mut self, source: impl Iterator<Item = T> + 'static) {
        self.source = Box::new(source);
        self.ahead.clear();
        self.history.clear();
        self.back = 0;
    }

    /// Whether `next` would produce an item. Pulls at most one item.
    pub fn has_next(&mut self) -> bool {
        if self.back > 0 || !self.ahead.is_empty() {
            return true;
        }
        match self.source.next() {
            Some(item) => {
                self.ahead.push_back(item);
                true
            }
            None => false,
        }
    }

    /// Whether `previous` would produce an item
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.back < self.history.len()
    }

    /// Step back and return the item at the new position
    pub fn previous(&mut self) -> Option<T> {
        if !self.has_previous() {
            return None;
        }
        self.back += 1;
        self.history.get(self.history.len() - self.back).cloned()
    }

    /// Items produced so far before the cursor position
    #[must_use]
    pub fn index(&self) -> usize {
        self.history.len() - self.back
    }

    /// History, lookahead and the rest of the source, in order.
    ///
    /// Drains the source into the lookahead buffer, so the cursor position
    /// and anything `next` returns afterwards are unchanged.
    pub fn to_list(&mut self) -> Vec<T> {
        self.ahead.extend(self.source.by_ref());
        self.history
            .iter()
            .chain(self.ahead.iter())
            .cloned()
            .collect()
    }
}

impl<T: Clone + 'static> Iterator for ReplayCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.back > 0 {
            let item = self.history.get(self.history.len() - self.back).cloned();
            self.back -= 1;
            return item;
        }
        let item = self.ahead.pop_front().or_else(|| self.source.next())?;
        self.history.push(item.clone());
        Some(item)
    }
}

impl<T> std::fmt::Debug for ReplayCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayCursor")
            .field("produced", &self.history.len())
            .field("back", &self.back)
            .field("ahead", &self.ahead.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_forward_and_back() {
        let mut cursor = ReplayCursor::from_vec(vec![1, 2, 3]);
        assert!(!cursor.has_previous());
        assert_eq!(cursor.next(), Some(1));
        assert_eq!(cursor.next(), Some(2));
        assert_eq!(cursor.previous(), Some(2));
        assert_eq!(cursor.previous(), Some(1));
        assert!(!cursor.has_previous());
        assert_eq!(cursor.previous(), None);
        assert_eq!(cursor.next(), Some(1));
        assert_eq!(cursor.next(), Some(2));
        assert_eq!(cursor.next(), Some(3));
        assert!(!cursor.has_next());
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_has_next_pulls_at_most_one() {
        let pulls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulls);
        let source = (0..).inspect(move |_| counter.set(counter.get() + 1));
        let mut cursor = ReplayCursor::new(source);
        assert!(cursor.has_next());
        assert!(cursor.has_next());
        assert_eq!(pulls.get(), 1);
        assert_eq!(cursor.next(), Some(0));
        assert_eq!(pulls.get(), 1);
        assert_eq!(cursor.next(), Some(1));
        assert_eq!(pulls.get(), 2);
    }

    #[test]
    fn test_to_list_keeps_position() {
        let mut cursor = ReplayCursor::from_vec(vec!["a", "b", "c"]);
        assert_eq!(cursor.next(), Some("a"));
        assert!(cursor.has_next());
        assert_eq!(cursor.to_list(), vec!["a", "b", "c"]);
        assert_eq!(cursor.index(), 1);
        assert_eq!(cursor.next(), Some("b"));
        assert_eq!(cursor.to_list(), vec!["a", "b", "c"]);
        assert_eq!(cursor.next(), Some("c"));
    }

    #[test]
    fn test_reset_with() {
        let mut cursor = ReplayCursor::from_vec(vec![1, 2]);
        cursor.next();
        cursor.reset_with(vec![9].into_iter());
        assert!(!cursor.has_previous());
        assert_eq!(cursor.to_list(), vec![9]);
        assert_eq!(cursor.next(), Some(9));
    }

    proptest::proptest! {
        #[test]
        fn prop_walk_matches_list(items in proptest::collection::vec(any::<i32>(), 0..20), steps in 0usize..20) {
            let mut cursor = ReplayCursor::from_vec(items.clone());
            let taken: Vec<i32> = cursor.by_ref().take(steps).collect();
            prop_assert_eq!(&taken[..], &items[..steps.min(items.len())]);
            let mut back = Vec::new();
            while let Some(v) = cursor.previous() {
                back.push(v);
            }
            back.reverse();
            prop_assert_eq!(back, taken);
            prop_assert_eq!(cursor.to_list(), items);
        }
    }
}
