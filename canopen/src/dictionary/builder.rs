use std::collections::HashMap;

use super::{Array, Attribute, DataType, ObjectDictionary, ObjectType, Record, Value, Variable};

/// Programmatic constructor for an [`ObjectDictionary`].
///
/// Entries are registered one at a time with explicit index, subindex, data
/// type and attributes, rather than parsed from an EDS/DCF file.
#[derive(Debug)]
pub struct ObjectDictionaryBuilder {
    node_id: u8,
    index_to_object: HashMap<u16, ObjectType>,
    name_to_index: HashMap<String, u16>,
}

impl ObjectDictionaryBuilder {
    /// Start building a dictionary for the given node ID.
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            index_to_object: HashMap::new(),
            name_to_index: HashMap::new(),
        }
    }

    /// Register a VAR entry.
    pub fn variable(mut self, index: u16, name: impl Into<String>, data_type: DataType, attribute: Attribute, value: Value) -> Self {
        let name = name.into();
        let var = Variable::new(index, 0, name.clone(), data_type, attribute).with_value(value);
        self.name_to_index.insert(name, index);
        self.index_to_object.insert(index, ObjectType::Variable(var));
        self
    }

    /// Register a DOMAIN entry: a VAR whose length is unbounded and streams incrementally.
    pub fn domain(mut self, index: u16, name: impl Into<String>, attribute: Attribute) -> Self {
        let name = name.into();
        let var = Variable::new(index, 0, name.clone(), DataType::Domain, attribute);
        self.name_to_index.insert(name, index);
        self.index_to_object.insert(index, ObjectType::Variable(var));
        self
    }

    /// Register an ARRAY entry. `entries` are the sub-entries at subindex 1..=n;
    /// subindex 0 (highest subindex supported) is synthesized automatically.
    pub fn array(mut self, index: u16, name: impl Into<String>, entries: impl IntoIterator<Item = Variable>) -> Self {
        let name = name.into();
        let mut array = Array::new(name.clone(), index);
        let mut highest = 0u8;
        for entry in entries {
            highest = highest.max(entry.sub_index);
            array.push(entry);
        }
        array.push(Variable::new(index, 0, "highest sub-index supported", DataType::Unsigned8, Attribute::READ_ONLY)
            .with_value(Value::from_bytes(&[highest])));
        self.name_to_index.insert(name, index);
        self.index_to_object.insert(index, ObjectType::Array(array));
        self
    }

    /// Register a RECORD entry. `entries` are the named sub-entries at subindex 1..=n;
    /// subindex 0 (highest subindex supported) is synthesized automatically.
    pub fn record(mut self, index: u16, name: impl Into<String>, entries: impl IntoIterator<Item = Variable>) -> Self {
        let name = name.into();
        let mut record = Record::new(name.clone(), index);
        let mut highest = 0u8;
        for entry in entries {
            highest = highest.max(entry.sub_index);
            record.push(entry);
        }
        record.push(Variable::new(index, 0, "highest sub-index supported", DataType::Unsigned8, Attribute::READ_ONLY)
            .with_value(Value::from_bytes(&[highest])));
        self.name_to_index.insert(name, index);
        self.index_to_object.insert(index, ObjectType::Record(record));
        self
    }

    /// Insert a fully-constructed entry directly.
    pub fn object(mut self, index: u16, name: impl Into<String>, object: ObjectType) -> Self {
        self.name_to_index.insert(name.into(), index);
        self.index_to_object.insert(index, object);
        self
    }

    /// Finish construction.
    pub fn build(self) -> ObjectDictionary {
        ObjectDictionary {
            node_id: self.node_id,
            index_to_object: self.index_to_object,
            name_to_index: self.name_to_index,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_synthesizes_subindex_zero() {
        let od = ObjectDictionaryBuilder::new(1)
            .array(0x2000, "Array", [
                Variable::new(0x2000, 1, "Elem1", DataType::Unsigned8, Attribute::READ_WRITE),
                Variable::new(0x2000, 2, "Elem2", DataType::Unsigned8, Attribute::READ_WRITE),
            ])
            .build();
        let entry = od.get(0x2000, 0).unwrap();
        assert_eq!(entry.value.as_slice(), &[2]);
    }
}
