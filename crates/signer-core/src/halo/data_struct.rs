//! Structured data reads.
//!
//! `get_data_struct` reads a batch of chip objects named by
//! `(object type, slot index)` pairs. The chip may answer with only part of
//! the batch and set `isPartial`. [`fetch_data_struct`] then asks again for
//! the objects still missing, until the chip reports completion or nothing is
//! left to ask for.
//!
//! Results accumulate under their `"type:index"` key. A key that is already
//! filled is never overwritten by a later round.
//!
//! The loop is bounded: a partial response that fills none of the missing
//! keys is a protocol error, so a batch of N keys takes at most N rounds.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use log::debug;
use serde::{Deserialize, Serialize};

use super::Chip;
use super::command::DataStructResponse;
use super::session::HaloSession;
use crate::error::{ChipError, Error, Result};

const COMMAND: &str = "get_data_struct";

/// Kinds of object the chip can report through `get_data_struct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectType {
    /// Uncompressed public key of a slot.
    PublicKey,
    /// Compressed public key of a slot.
    CompressedPublicKey,
    /// Attestation over a slot's public key.
    PublicKeyAttest,
    /// Slot configuration flags.
    KeySlotFlags,
    /// Failed password attempts on a slot.
    KeySlotFailedAuthCtr,
    /// Value of a latch.
    LatchValue,
    /// Attestation over a latch value.
    LatchAttest,
    /// User-writable graffiti.
    Graffiti,
    /// Chip firmware version.
    FirmwareVersion,
}

impl ObjectType {
    /// Returns the type name as the chip spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicKey => "publicKey",
            Self::CompressedPublicKey => "compressedPublicKey",
            Self::PublicKeyAttest => "publicKeyAttest",
            Self::KeySlotFlags => "keySlotFlags",
            Self::KeySlotFailedAuthCtr => "keySlotFailedAuthCtr",
            Self::LatchValue => "latchValue",
            Self::LatchAttest => "latchAttest",
            Self::Graffiti => "graffiti",
            Self::FirmwareVersion => "firmwareVersion",
        }
    }

    /// Returns every object type.
    #[must_use]
    pub const fn all() -> [Self; 9] {
        [
            Self::PublicKey,
            Self::CompressedPublicKey,
            Self::PublicKeyAttest,
            Self::KeySlotFlags,
            Self::KeySlotFailedAuthCtr,
            Self::LatchValue,
            Self::LatchAttest,
            Self::Graffiti,
            Self::FirmwareVersion,
        ]
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::malformed(COMMAND, format!("unknown object type `{s}`")))
    }
}

/// One requested object: a type and the slot (or latch) index it belongs to.
///
/// Displays and parses as `"type:index"`, the form used both in the request
/// `spec` and as the key of the response data.
///
/// # Example
///
/// ```
/// use halo_evm_signer_core::halo::{DataStructKey, ObjectType};
///
/// let key: DataStructKey = "publicKey:2".parse().unwrap();
/// assert_eq!(key, DataStructKey::new(ObjectType::PublicKey, 2));
/// assert_eq!(key.to_string(), "publicKey:2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataStructKey {
    /// The object type.
    pub object_type: ObjectType,
    /// The slot or latch index.
    pub index: u32,
}

impl DataStructKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(object_type: ObjectType, index: u32) -> Self {
        Self { object_type, index }
    }
}

impl fmt::Display for DataStructKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.index)
    }
}

impl FromStr for DataStructKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (object_type, index) = s
            .split_once(':')
            .ok_or_else(|| Error::malformed(COMMAND, format!("key `{s}` is not type:index")))?;
        let index = index
            .parse()
            .map_err(|e| Error::malformed(COMMAND, format!("key `{s}` has a bad index: {e}")))?;

        Ok(Self::new(object_type.parse()?, index))
    }
}

/// Reads every requested object, issuing as many `get_data_struct` rounds as
/// the chip needs.
///
/// Duplicate keys are requested once. The result holds everything the chip
/// returned; its `is_partial` is `true` only if the chip declared itself done
/// while some requested keys were still absent. It is derived from the
/// missing keys rather than copied from the last round's `isPartial`, so a
/// chip that stops early without saying so is still reported as partial.
///
/// # Errors
///
/// - [`Error::Protocol`] with "no data received" if `keys` is empty
/// - [`Error::Protocol`] if a partial round fills none of the missing keys
/// - any error of the underlying command
pub async fn fetch_data_struct<C: Chip>(
    session: &HaloSession<C>,
    keys: &[DataStructKey],
) -> Result<DataStructResponse> {
    if keys.is_empty() {
        return Err(Error::protocol(
            COMMAND,
            ChipError::new(None, "no data received"),
        ));
    }

    let mut remaining: Vec<DataStructKey> = Vec::with_capacity(keys.len());
    for key in keys {
        if !remaining.contains(key) {
            remaining.push(*key);
        }
    }

    let mut data = BTreeMap::new();
    let mut round = 0usize;

    loop {
        round += 1;
        debug!(
            "get_data_struct round {round}: requesting {} objects",
            remaining.len()
        );

        let response = session.get_data_struct(&remaining).await?;
        merge(&mut data, response.data);

        let before = remaining.len();
        remaining.retain(|key| !data.contains_key(&key.to_string()));

        if !response.is_partial || remaining.is_empty() {
            break;
        }
        if remaining.len() == before {
            return Err(Error::malformed(
                COMMAND,
                format!(
                    "partial response returned none of the {} missing objects",
                    remaining.len()
                ),
            ));
        }
    }

    debug!(
        "get_data_struct done after {round} rounds, {} objects, {} missing",
        data.len(),
        remaining.len()
    );

    Ok(DataStructResponse {
        is_partial: !remaining.is_empty(),
        data,
    })
}

/// Fills keys that are still absent; keys already present keep their value.
fn merge(
    accumulated: &mut BTreeMap<String, Option<serde_json::Value>>,
    round: BTreeMap<String, Option<serde_json::Value>>,
) {
    for (key, value) in round {
        if let Entry::Vacant(entry) = accumulated.entry(key) {
            entry.insert(value);
        }
    }
}
