use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Counters for one processing run, merged across ticks for progress logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub updated: usize,
    pub deleted: usize,
}

impl Report {
    pub fn merge(&mut self, other: Report) {
        self.updated += other.updated;
        self.deleted += other.deleted;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updated == 0 && self.deleted == 0
    }
}

impl AddAssign for Report {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(rhs);
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} updated entries, {} deleted entries",
            self.updated, self.deleted
        )
    }
}
