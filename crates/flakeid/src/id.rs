use core::fmt;

/// A 64-bit Snowflake ID carrying both a data-center ID and a worker ID.
///
/// - 1 bit reserved (always zero, keeps the value a non-negative `i64`)
/// - 39 bits timestamp (ms since the generator epoch)
/// - 6 bits data-center ID
/// - 6 bits worker ID
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            24 23               18 17           12 11             0
///              +--------------+----------------+-------------------+---------------+---------------+
///  Field:      | reserved (1) | timestamp (39) | data center ID (6)| worker ID (6) | sequence (12) |
///              +--------------+----------------+-------------------+---------------+---------------+
///              |<------------------- MSB ----------------- 64 bits ---------------- LSB ---------->|
/// ```
///
/// The timestamp is stored as a delta from the epoch of the generator that
/// produced the ID, see [`DEFAULT_EPOCH`].
///
/// # Example
///
/// ```
/// use flakeid::FlakeId;
///
/// let id = FlakeId::from_components(1000, 2, 3, 1);
/// assert_eq!(id.timestamp(), 1000);
/// assert_eq!(id.data_center_id(), 2);
/// assert_eq!(id.worker_id(), 3);
/// assert_eq!(id.sequence(), 1);
/// ```
///
/// [`DEFAULT_EPOCH`]: crate::DEFAULT_EPOCH
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlakeId {
    id: u64,
}

impl FlakeId {
    /// Bitmask for extracting the 39-bit timestamp field. Occupies bits 24
    /// through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 39) - 1;

    /// Bitmask for extracting the 6-bit data-center ID field. Occupies bits 18
    /// through 23.
    pub const DATA_CENTER_ID_MASK: u64 = (1 << 6) - 1;

    /// Bitmask for extracting the 6-bit worker ID field. Occupies bits 12
    /// through 17.
    pub const WORKER_ID_MASK: u64 = (1 << 6) - 1;

    /// Bitmask for extracting the 12-bit sequence field. Occupies bits 0
    /// through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its correct position (bit 24).
    pub const TIMESTAMP_SHIFT: u64 = 24;

    /// Number of bits to shift the data-center ID (bit 18).
    pub const DATA_CENTER_ID_SHIFT: u64 = 18;

    /// Number of bits to shift the worker ID (bit 12).
    pub const WORKER_ID_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence field (bit 0).
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Packs the four components into an ID. Each component is masked to its
    /// field width.
    pub const fn from_components(
        timestamp: u64,
        data_center_id: u64,
        worker_id: u64,
        sequence: u64,
    ) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let data_center_id =
            (data_center_id & Self::DATA_CENTER_ID_MASK) << Self::DATA_CENTER_ID_SHIFT;
        let worker_id = (worker_id & Self::WORKER_ID_MASK) << Self::WORKER_ID_SHIFT;
        let sequence = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | data_center_id | worker_id | sequence,
        }
    }

    /// Extracts the timestamp delta from the packed ID.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the data-center ID from the packed ID.
    pub const fn data_center_id(&self) -> u64 {
        (self.id >> Self::DATA_CENTER_ID_SHIFT) & Self::DATA_CENTER_ID_MASK
    }

    /// Extracts the worker ID from the packed ID.
    pub const fn worker_id(&self) -> u64 {
        (self.id >> Self::WORKER_ID_SHIFT) & Self::WORKER_ID_MASK
    }

    /// Extracts the sequence number from the packed ID.
    pub const fn sequence(&self) -> u64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    pub const fn max_timestamp() -> u64 {
        Self::TIMESTAMP_MASK
    }

    pub const fn max_data_center_id() -> u64 {
        Self::DATA_CENTER_ID_MASK
    }

    pub const fn max_worker_id() -> u64 {
        Self::WORKER_ID_MASK
    }

    pub const fn max_sequence() -> u64 {
        Self::SEQUENCE_MASK
    }

    /// Converts this type into its raw representation.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Wraps a raw value. No validation is performed.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Returns the ID as a signed integer. The reserved bit is never set by a
    /// generator, so this is always non-negative for generated IDs.
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_i64(&self) -> i64 {
        self.id as i64
    }

    /// Returns the absolute Unix timestamp (ms) of this ID for a given epoch.
    pub const fn unix_millis(&self, epoch_ms: u64) -> u64 {
        self.timestamp() + epoch_ms
    }

    /// Returns the ID as a zero-padded 20-digit string.
    pub fn to_padded_string(&self) -> String {
        format!("{:020}", self.id)
    }
}

impl From<FlakeId> for i64 {
    fn from(id: FlakeId) -> Self {
        id.as_i64()
    }
}

impl From<FlakeId> for u64 {
    fn from(id: FlakeId) -> Self {
        id.to_raw()
    }
}

impl fmt::Display for FlakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for FlakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakeId")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp())
            .field("data_center_id", &self.data_center_id())
            .field("worker_id", &self.worker_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flake_id_fields_and_bounds() {
        let ts = FlakeId::max_timestamp();
        let dc = FlakeId::max_data_center_id();
        let worker = FlakeId::max_worker_id();
        let seq = FlakeId::max_sequence();

        let id = FlakeId::from_components(ts, dc, worker, seq);
        println!("ID: {id:?}");
        assert_eq!(id.timestamp(), ts);
        assert_eq!(id.data_center_id(), dc);
        assert_eq!(id.worker_id(), worker);
        assert_eq!(id.sequence(), seq);
        assert_eq!(FlakeId::from_raw(id.to_raw()), id);
    }

    #[test]
    fn test_flake_id_reserved_bit_is_never_set() {
        let id = FlakeId::from_components(u64::MAX, u64::MAX, u64::MAX, u64::MAX);
        assert_eq!(id.to_raw() >> 63, 0);
        assert!(id.as_i64() >= 0);
        assert_eq!(id.as_i64(), i64::MAX);
    }

    #[test]
    fn test_flake_id_matches_shift_formula() {
        let (delta, dc, worker, seq) = (123_456_789_u64, 1_u64, 1_u64, 7_u64);
        let expected = (delta << 24) | (dc << 18) | (worker << 12) | seq;
        assert_eq!(FlakeId::from_components(delta, dc, worker, seq).to_raw(), expected);
    }

    #[test]
    fn test_flake_id_fields_are_disjoint() {
        let a = FlakeId::from_components(5, 1, 2, 9);
        let b = FlakeId::from_components(5, 2, 1, 9);
        let c = FlakeId::from_components(5, 1, 3, 9);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_flake_id_orders_by_timestamp_then_sequence() {
        let earlier = FlakeId::from_components(10, 63, 63, 4095);
        let later = FlakeId::from_components(11, 0, 0, 0);
        assert!(earlier < later);

        let first = FlakeId::from_components(10, 3, 3, 0);
        let second = FlakeId::from_components(10, 3, 3, 1);
        assert!(first < second);
    }

    #[test]
    fn test_flake_id_padded_string() {
        let id = FlakeId::from_raw(42);
        assert_eq!(id.to_padded_string(), "00000000000000000042");
        assert_eq!(id.to_string(), "42");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_flake_id_serializes_as_integer() {
        let id = FlakeId::from_components(1_000, 1, 1, 0);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, id.to_raw().to_string());
        assert_eq!(serde_json::from_str::<FlakeId>(&json).unwrap(), id);
    }
}
