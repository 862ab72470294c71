/// The access attributes of an object dictionary sub-entry.
///
/// Mirrors CiA 301's `SDO_R` / `SDO_W` flags plus the `STR` (string) flag
/// that governs early-NUL termination and short-write padding.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Attribute {
	/// The entry services SDO uploads.
	pub sdo_r: bool,
	/// The entry services SDO downloads.
	pub sdo_w: bool,
	/// The entry is a NUL-terminated/padded string.
	pub str_type: bool,
	/// The entry may be mapped into a PDO.
	pub pdo_mappable: bool,
}

impl Attribute {
	/// Neither readable nor writable over SDO.
	pub const NONE: Self = Self { sdo_r: false, sdo_w: false, str_type: false, pdo_mappable: false };

	/// Readable and writable over SDO.
	pub const READ_WRITE: Self = Self { sdo_r: true, sdo_w: true, str_type: false, pdo_mappable: false };

	/// Readable only.
	pub const READ_ONLY: Self = Self { sdo_r: true, sdo_w: false, str_type: false, pdo_mappable: false };

	/// Writable only.
	pub const WRITE_ONLY: Self = Self { sdo_r: false, sdo_w: true, str_type: false, pdo_mappable: false };

	/// Mark this attribute set as a string entry (enables `STR` semantics).
	pub const fn with_str(mut self) -> Self {
		self.str_type = true;
		self
	}

	/// Mark this attribute set as PDO-mappable.
	pub const fn with_pdo_mappable(mut self) -> Self {
		self.pdo_mappable = true;
		self
	}

	/// Whether an SDO upload is permitted.
	pub const fn is_readable(&self) -> bool {
		self.sdo_r
	}

	/// Whether an SDO download is permitted.
	pub const fn is_writable(&self) -> bool {
		self.sdo_w
	}
}
