//! Recipient filters: who a user message is addressed to.
//!
//! Envelopes hold recipients as `Arc<dyn RecipientFilter>`; they read the set
//! during `send` and never modify it.

use std::fmt;

/// Player (edict) index of one recipient.
pub type RecipientIndex = u32;

/// Engine-style recipient filter.
pub trait RecipientFilter: fmt::Debug + Send + Sync {
    fn recipient_count(&self) -> usize;

    /// Recipient at position `slot`, `None` past the end.
    fn recipient_index(&self, slot: usize) -> Option<RecipientIndex>;

    /// Reliable delivery requested.
    fn is_reliable(&self) -> bool {
        false
    }

    /// Part of the connection-time init sequence.
    fn is_init_message(&self) -> bool {
        false
    }

    fn iter(&self) -> RecipientIter<'_>
    where
        Self: Sized,
    {
        RecipientIter {
            filter: self,
            slot: 0,
        }
    }
}

impl dyn RecipientFilter + '_ {
    /// Iterate over a type-erased filter.
    pub fn recipients(&self) -> RecipientIter<'_> {
        RecipientIter {
            filter: self,
            slot: 0,
        }
    }
}

/// Iterator over a filter's recipient indices.
pub struct RecipientIter<'a> {
    filter: &'a dyn RecipientFilter,
    slot: usize,
}

impl Iterator for RecipientIter<'_> {
    type Item = RecipientIndex;

    fn next(&mut self) -> Option<Self::Item> {
        while self.slot < self.filter.recipient_count() {
            let slot = self.slot;
            self.slot += 1;
            if let Some(index) = self.filter.recipient_index(slot) {
                return Some(index);
            }
        }
        None
    }
}

/// Ordered set of unique recipient indices.
///
/// Kept as a sorted `Vec` so slot lookups are constant time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecipientSet {
    recipients: Vec<RecipientIndex>,
    reliable: bool,
    init_message: bool,
}

impl RecipientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding exactly one recipient.
    pub fn single(index: RecipientIndex) -> Self {
        let mut set = Self::new();
        set.add(index);
        set
    }

    pub fn with_reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }

    pub fn with_init_message(mut self, init_message: bool) -> Self {
        self.init_message = init_message;
        self
    }

    /// Add a recipient; returns false if it was already present.
    pub fn add(&mut self, index: RecipientIndex) -> bool {
        match self.recipients.binary_search(&index) {
            Ok(_) => false,
            Err(pos) => {
                self.recipients.insert(pos, index);
                true
            }
        }
    }

    /// Add every index in `range`.
    pub fn add_range(&mut self, range: impl IntoIterator<Item = RecipientIndex>) {
        self.recipients.extend(range);
        self.recipients.sort_unstable();
        self.recipients.dedup();
    }

    pub fn remove(&mut self, index: RecipientIndex) -> bool {
        match self.recipients.binary_search(&index) {
            Ok(pos) => {
                self.recipients.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, index: RecipientIndex) -> bool {
        self.recipients.binary_search(&index).is_ok()
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

impl FromIterator<RecipientIndex> for RecipientSet {
    fn from_iter<I: IntoIterator<Item = RecipientIndex>>(iter: I) -> Self {
        let mut set = Self::default();
        set.add_range(iter);
        set
    }
}

impl RecipientFilter for RecipientSet {
    fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    fn recipient_index(&self, slot: usize) -> Option<RecipientIndex> {
        self.recipients.get(slot).copied()
    }

    fn is_reliable(&self) -> bool {
        self.reliable
    }

    fn is_init_message(&self) -> bool {
        self.init_message
    }
}
