use super::{Array, Record, Variable};

/// The shape of a top-level object dictionary entry.
///
/// CiA 301 distinguishes VAR, ARRAY, RECORD and DOMAIN objects, but DOMAIN
/// is structurally just a VAR whose [`DataType`](super::DataType) is
/// [`Domain`](super::DataType::Domain) and which streams incrementally
/// rather than reporting a fixed length; it is represented here as
/// `ObjectType::Variable` like any other VAR entry.
#[derive(Clone, Debug)]
pub enum ObjectType {
    Variable(Variable),
    Array(Array),
    Record(Record),
}

impl ObjectType {
    /// Look up the sub-entry at `subindex`, regardless of the container shape.
    pub fn get(&self, subindex: u8) -> Option<&Variable> {
        match self {
            Self::Variable(var) => (subindex == 0).then_some(var),
            Self::Array(arr) => arr.get(subindex),
            Self::Record(rec) => rec.get(subindex),
        }
    }

    /// Look up the sub-entry at `subindex` mutably, regardless of the container shape.
    pub fn get_mut(&mut self, subindex: u8) -> Option<&mut Variable> {
        match self {
            Self::Variable(var) => (subindex == 0).then_some(var),
            Self::Array(arr) => arr.get_mut(subindex),
            Self::Record(rec) => rec.get_mut(subindex),
        }
    }

    /// The highest valid subindex for this entry.
    pub fn highest_subindex(&self) -> u8 {
        match self {
            Self::Variable(_) => 0,
            Self::Array(arr) => arr.highest_subindex(),
            Self::Record(rec) => rec.highest_subindex(),
        }
    }
}
