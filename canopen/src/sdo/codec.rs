//! Bit-field helpers for the fixed 8-byte SDO command frames.
//!
//! [`Toggle`] and [`SeqNo`] exist so the segmented and block protocols never
//! pass a raw `u8` around for these two fields: both have a narrow legal
//! range and a well-defined "next" operation, and mixing them up with an
//! unrelated `u8` is a real bug we'd like the type system to catch.

/// The alternating toggle bit used by the segmented upload/download protocols.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Toggle(bool);

impl Toggle {
	/// The initial toggle value of a fresh segmented transfer.
	pub const INITIAL: Self = Self(false);

	/// Build a toggle from its bit value (`false` for the initial segment).
	pub const fn new(set: bool) -> Self {
		Self(set)
	}

	/// Whether the toggle bit is set.
	pub const fn is_set(self) -> bool {
		self.0
	}

	/// The next expected toggle value.
	pub const fn flip(self) -> Self {
		Self(!self.0)
	}

	/// The bit mask (`0x00` or `0x10`) as it appears in byte 0 of a segment frame.
	pub const fn as_mask(self) -> u8 {
		(self.0 as u8) << 4
	}

	/// Extract the toggle bit from byte 0 of a segment frame.
	pub const fn from_command_byte(byte: u8) -> Self {
		Self(byte & 0x10 != 0)
	}
}

/// A block-transfer sequence number, valid in the range `1..=127`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct SeqNo(u8);

impl SeqNo {
	/// The first sequence number of a sub-block.
	pub const FIRST: Self = Self(1);

	/// Build a sequence number, returning `None` if `value` is `0` or exceeds 127.
	pub const fn new(value: u8) -> Option<Self> {
		if value == 0 || value > 127 {
			None
		} else {
			Some(Self(value))
		}
	}

	/// Extract the sequence number from byte 0 of a block sub-frame
	/// (bit 7 is the "last frame in sub-block" marker, not part of the number).
	pub const fn from_command_byte(byte: u8) -> Option<Self> {
		Self::new(byte & 0x7F)
	}

	/// The raw numeric value.
	pub const fn value(self) -> u8 {
		self.0
	}

	/// The next sequence number, or `None` once 127 is exceeded.
	pub const fn next(self) -> Option<Self> {
		Self::new(self.0 + 1)
	}
}

/// A block size, valid in the range `1..=127`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockSize(u8);

impl BlockSize {
	/// The largest legal block size.
	pub const MAX: Self = Self(127);

	/// Build a block size, returning `None` if `value` is `0` or exceeds 127.
	pub const fn new(value: u8) -> Option<Self> {
		if value == 0 || value > 127 {
			None
		} else {
			Some(Self(value))
		}
	}

	/// The raw numeric value.
	pub const fn value(self) -> u8 {
		self.0
	}
}

/// The Protocol Switch Threshold: block transfers downgrade to segmented or
/// expedited when the indicated size is at or below this many bytes.
pub const PROTOCOL_SWITCH_THRESHOLD: u8 = 21;

/// Whether a byte marks the last frame of a block sub-block (bit 7 set).
pub const fn is_last_block_frame(byte: u8) -> bool {
	byte & 0x80 != 0
}

/// Set the "last frame" marker (bit 7) on a block sub-frame command byte.
pub const fn with_last_block_frame(byte: u8, last: bool) -> u8 {
	if last {
		byte | 0x80
	} else {
		byte & !0x80
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn toggle_flips_and_round_trips_through_command_byte() {
		let t = Toggle::INITIAL;
		assert!(!t.is_set());
		let t = t.flip();
		assert!(t.is_set());
		assert_eq!(Toggle::from_command_byte(t.as_mask()), t);
	}

	#[test]
	fn seqno_rejects_zero_and_over_127() {
		assert!(SeqNo::new(0).is_none());
		assert!(SeqNo::new(128).is_none());
		assert!(SeqNo::new(127).is_some());
	}

	#[test]
	fn seqno_next_saturates_past_127() {
		let last = SeqNo::new(127).unwrap();
		assert!(last.next().is_none());
	}
}
