use std::collections::HashMap;

use super::Variable;

/// A RECORD object: a heterogeneous, fixed set of named sub-entries.
#[derive(Clone, Debug)]
pub struct Record {
	/// Human-readable name.
	pub name: String,
	/// The top-level index.
	pub index: u16,
	index_to_variable: HashMap<u8, Variable>,
	name_to_index: HashMap<String, u8>,
}

impl Record {
	/// Start a new, empty record.
	pub fn new(name: impl Into<String>, index: u16) -> Self {
		Self {
			name: name.into(),
			index,
			name_to_index: HashMap::new(),
			index_to_variable: HashMap::new(),
		}
	}

	/// Insert or replace a sub-entry.
	pub fn push(&mut self, var: Variable) {
		self.name_to_index.insert(var.name.clone(), var.sub_index);
		self.index_to_variable.insert(var.sub_index, var);
	}

	/// Look up a sub-entry by subindex.
	pub fn get(&self, sub_index: u8) -> Option<&Variable> {
		self.index_to_variable.get(&sub_index)
	}

	/// Look up a sub-entry by subindex, mutably.
	pub fn get_mut(&mut self, sub_index: u8) -> Option<&mut Variable> {
		self.index_to_variable.get_mut(&sub_index)
	}

	/// Look up a sub-entry by name.
	pub fn get_by_name(&self, name: &str) -> Option<&Variable> {
		let index = *self.name_to_index.get(name)?;
		self.index_to_variable.get(&index)
	}

	/// The highest subindex with a sub-entry, if any exist beyond subindex 0.
	pub fn highest_subindex(&self) -> u8 {
		self.index_to_variable.keys().copied().filter(|&i| i > 0).max().unwrap_or(0)
	}
}
