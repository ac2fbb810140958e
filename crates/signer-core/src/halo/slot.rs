//! Key slot numbers.
//!
//! A HaLo chip stores its keys in numbered slots. The chip alone decides which
//! slots exist and what they hold; a [`Slot`] is only the number sent as
//! `keyNo` in chip commands.
//!
//! # Example
//!
//! ```
//! use halo_evm_signer_core::halo::Slot;
//!
//! let slot = Slot::new(2).unwrap();
//! assert_eq!(slot.key_no(), 2);
//! assert_eq!(slot.to_string(), "slot 2");
//! assert!(Slot::new(0).is_err());
//! ```

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A chip key slot, identified by a positive number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Slot(NonZeroU32);

impl Slot {
    /// The first slot on the chip.
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    /// Creates a slot from its number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlot`] for slot `0`.
    pub const fn new(key_no: u32) -> Result<Self> {
        match NonZeroU32::new(key_no) {
            Some(key_no) => Ok(Self(key_no)),
            None => Err(Error::InvalidSlot(key_no)),
        }
    }

    /// Returns the number sent to the chip as `keyNo`.
    ///
    /// # Example
    ///
    /// ```
    /// use halo_evm_signer_core::halo::Slot;
    ///
    /// assert_eq!(Slot::FIRST.key_no(), 1);
    /// ```
    #[must_use]
    pub const fn key_no(self) -> u32 {
        self.0.get()
    }

    /// Returns the slots `1..=count`, the range a slot picker offers.
    ///
    /// # Example
    ///
    /// ```
    /// use halo_evm_signer_core::halo::Slot;
    ///
    /// let slots: Vec<u32> = Slot::range(9).map(Slot::key_no).collect();
    /// assert_eq!(slots, (1..=9).collect::<Vec<_>>());
    /// ```
    pub fn range(count: u32) -> impl Iterator<Item = Self> {
        (1..=count).filter_map(|n| NonZeroU32::new(n).map(Self))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

impl TryFrom<u32> for Slot {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Slot> for u32 {
    fn from(slot: Slot) -> Self {
        slot.key_no()
    }
}
