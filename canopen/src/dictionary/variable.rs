use super::{Attribute, DataType, Value};

/// A single (index, subindex) leaf in the object dictionary.
#[derive(Clone, Debug)]
pub struct Variable {
	/// Human-readable name, as would appear in an EDS `ParameterName`.
	pub name: String,
	/// The wire data type of the value.
	pub data_type: DataType,
	/// The current backing value.
	pub value: Value,
	/// SDO/PDO access attributes.
	pub attribute: Attribute,
	/// Declared length in bytes; `0` means variable-length (domains and
	/// unbounded strings).
	pub data_length: usize,
	/// The top-level index this variable lives under.
	pub index: u16,
	/// The subindex within that entry.
	pub sub_index: u8,
}

impl Variable {
	/// Build a new variable with a default (all-zero / empty) value.
	pub fn new(index: u16, sub_index: u8, name: impl Into<String>, data_type: DataType, attribute: Attribute) -> Self {
		let data_length = data_type.size();
		Self {
			name: name.into(),
			data_type,
			value: Value::from_bytes(&data_type.as_default_bytes()),
			attribute,
			data_length,
			index,
			sub_index,
		}
	}

	/// Set the initial value, overriding the declared length for
	/// variable-length (string/domain) entries.
	pub fn with_value(mut self, value: Value) -> Self {
		if self.data_type.size() == 0 {
			self.data_length = value.len();
		}
		self.value = value;
		self
	}

	/// Set an explicit declared length (useful for fixed-capacity strings).
	pub fn with_data_length(mut self, data_length: usize) -> Self {
		self.data_length = data_length;
		self
	}
}
