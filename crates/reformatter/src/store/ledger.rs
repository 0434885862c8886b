//! Coverage ledger: which append coordinates are fully written.

use std::collections::BTreeSet;

/// Committed append indices, stored as a watermark plus the committed
/// indices beyond it.
///
/// Every index `<= watermark` is committed. `ahead` only ever holds indices
/// greater than `watermark + 1`; reaching the gap folds them into the
/// watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageLedger {
    watermark: Option<u64>,
    ahead: BTreeSet<u64>,
}

impl CoverageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted parts, normalising the ahead set.
    pub fn from_parts(watermark: Option<u64>, ahead: impl IntoIterator<Item = u64>) -> Self {
        let mut ledger = Self {
            watermark,
            ahead: BTreeSet::new(),
        };
        for index in ahead {
            ledger.commit(index);
        }
        ledger
    }

    /// Last index of the contiguous committed prefix.
    pub fn watermark(&self) -> Option<u64> {
        self.watermark
    }

    /// Committed indices past the watermark, ascending.
    pub fn ahead(&self) -> impl Iterator<Item = u64> + '_ {
        self.ahead.iter().copied()
    }

    /// First index that is not part of the contiguous prefix.
    pub fn next_after_watermark(&self) -> u64 {
        self.watermark.map_or(0, |w| w + 1)
    }

    pub fn is_committed(&self, index: u64) -> bool {
        self.watermark.map_or(false, |w| index <= w) || self.ahead.contains(&index)
    }

    /// Mark `index` as committed. The watermark never moves backwards.
    ///
    /// Returns `true` if the ledger changed.
    pub fn commit(&mut self, index: u64) -> bool {
        if self.is_committed(index) {
            return false;
        }
        self.ahead.insert(index);

        let mut next = self.next_after_watermark();
        while self.ahead.remove(&next) {
            self.watermark = Some(next);
            next += 1;
        }
        true
    }

    /// Merge every commit of `other` into this ledger.
    pub fn merge(&mut self, other: &CoverageLedger) {
        if let Some(w) = other.watermark {
            for index in self.next_after_watermark()..=w {
                self.commit(index);
            }
        }
        for index in other.ahead() {
            self.commit(index);
        }
    }
}
