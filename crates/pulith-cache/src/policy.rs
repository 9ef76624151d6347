use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// A storage level of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Memory,
    Disk,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Memory => write!(f, "memory"),
            Tier::Disk => write!(f, "disk"),
        }
    }
}

/// Set of tiers an operation applies to.
///
/// ```
/// use pulith_cache::Policy;
///
/// let both = Policy::MEMORY | Policy::DISK;
/// assert!(both.contains(Policy::MEMORY));
/// assert_eq!(both, Policy::ALL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy(u8);

impl Policy {
    pub const NONE: Policy = Policy(0);
    pub const MEMORY: Policy = Policy(0b01);
    pub const DISK: Policy = Policy(0b10);
    pub const ALL: Policy = Policy(0b11);

    pub const fn contains(self, other: Policy) -> bool { self.0 & other.0 == other.0 }

    pub const fn is_empty(self) -> bool { self.0 == 0 }

    pub const fn includes(self, tier: Tier) -> bool {
        match tier {
            Tier::Memory => self.contains(Policy::MEMORY),
            Tier::Disk => self.contains(Policy::DISK),
        }
    }

    /// Tiers in lookup order: memory first, then disk.
    pub fn tiers(self) -> impl Iterator<Item = Tier> {
        [Tier::Memory, Tier::Disk]
            .into_iter()
            .filter(move |tier| self.includes(*tier))
    }
}

impl From<Tier> for Policy {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Memory => Policy::MEMORY,
            Tier::Disk => Policy::DISK,
        }
    }
}

impl BitOr for Policy {
    type Output = Policy;

    fn bitor(self, rhs: Self) -> Self::Output { Policy(self.0 | rhs.0) }
}

impl BitOrAssign for Policy {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}
