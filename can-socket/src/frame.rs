use crate::CanId;
use crate::error::{TryIntoCanDataError, TryNewCanFrameError, InvalidDlc};

#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct CanFrame {
	pub(crate) inner: crate::sys::CanFrame,
}

/// The payload of a CAN frame: at most 8 bytes.
#[derive(Copy, Clone)]
pub struct CanData {
	len: u8,
	data: [u8; 8],
}

impl CanData {
	/// An empty payload.
	pub const fn empty() -> Self {
		Self { len: 0, data: [0; 8] }
	}

	/// The number of bytes in the payload.
	pub fn len(&self) -> usize {
		self.len.into()
	}

	/// Check if the payload is empty.
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Get the payload as a byte slice.
	pub fn as_slice(&self) -> &[u8] {
		&self.data[..self.len.into()]
	}
}

impl std::ops::Deref for CanData {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		self.as_slice()
	}
}

impl std::fmt::Debug for CanData {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Debug::fmt(&self.as_slice(), f)
	}
}

impl PartialEq<[u8]> for CanData {
	fn eq(&self, other: &[u8]) -> bool {
		self.as_slice() == other
	}
}

impl TryFrom<&[u8]> for CanData {
	type Error = TryIntoCanDataError;

	fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
		if value.len() > 8 {
			return Err(TryIntoCanDataError { len: value.len() });
		}
		let mut data = [0u8; 8];
		data[..value.len()].copy_from_slice(value);
		Ok(Self { len: value.len() as u8, data })
	}
}

macro_rules! impl_can_data_from_array {
	($($n:literal),*) => {
		$(
			impl From<[u8; $n]> for CanData {
				fn from(value: [u8; $n]) -> Self {
					let mut data = [0u8; 8];
					data[..$n].copy_from_slice(&value);
					Self { len: $n, data }
				}
			}
		)*
	};
}

impl_can_data_from_array!(0, 1, 2, 3, 4, 5, 6, 7, 8);

impl CanFrame {
	/// Create a new data frame from an ID and a payload that is statically known to fit.
	///
	/// Use [`Self::try_new()`] if the payload length is only known at runtime.
	pub fn new(id: impl Into<CanId>, data: impl Into<CanData>) -> Self {
		let data = data.into();
		let inner = crate::sys::CanFrame::new(id.into(), data.as_slice(), None)
			.expect("CanId and CanData are always within range for the underlying frame");
		Self { inner }
	}

	/// Create a new data frame, rejecting payloads longer than 8 bytes.
	pub fn try_new(id: impl Into<CanId>, data: impl AsRef<[u8]>) -> Result<Self, TryNewCanFrameError> {
		let data = CanData::try_from(data.as_ref())?;
		Ok(Self::new(id, data))
	}

	/// Start building a new RTR (request-to-read) frame.
	pub fn new_rtr(id: impl Into<CanId>) -> RtrFrameBuilder {
		RtrFrameBuilder { id: id.into() }
	}

	pub fn id(&self) -> CanId {
		self.inner.id()
	}

	pub fn is_rtr(&self) -> bool {
		self.inner.is_rtr()
	}

	pub fn data(&self) -> &[u8] {
		self.inner.data()
	}

	pub fn data_length_code(&self) -> Option<u8> {
		self.inner.data_length_code()
	}
}

/// Builder for RTR frames, returned by [`CanFrame::new_rtr()`].
pub struct RtrFrameBuilder {
	id: CanId,
}

impl RtrFrameBuilder {
	/// Set the requested data length (0 to 8 bytes) and build the frame.
	pub fn with_data_length_code(self, data_length_code: u8) -> Result<CanFrame, InvalidDlc> {
		if data_length_code > 8 {
			return Err(InvalidDlc { value: data_length_code });
		}
		let inner = crate::sys::CanFrame::new_rtr(self.id, data_length_code)
			.expect("RTR frame construction with a valid CanId never fails");
		Ok(CanFrame { inner })
	}
}

impl std::fmt::Debug for CanFrame {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut debug = f.debug_struct("CanFrame");
		debug
			.field("id", &format_args!("{:?}", self.id()))
			.field("is_rtr", &self.is_rtr())
			.field("data_length_code", &self.data_length_code());
		if !self.is_rtr() {
			debug.field("data", &format_args!("{:02X?}", self.data()));
		}
		debug.finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::{assert, let_assert};

	#[test]
	fn can_frame_is_copy() {
		let_assert!(Ok(frame) = CanFrame::try_new(1u8, &[1, 2, 3, 4]));
		let copy = frame;
		assert!(copy.id() == CanId::Standard(1.into()));
		assert!(copy.data() == &[1, 2, 3, 4]);
	}

	#[test]
	fn can_data_rejects_oversized_payload() {
		let_assert!(Err(_) = CanData::try_from(&[0u8; 9][..]));
	}

	#[test]
	fn can_data_from_array_roundtrips() {
		let data = CanData::from([1, 2, 3]);
		assert!(data.as_slice() == &[1, 2, 3]);
	}
}
