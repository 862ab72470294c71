use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{ObjectType, OdError, Streamer, StreamStatus, Variable};

/// The object dictionary: an indexed tree of (index, subindex) entries.
///
/// Built once through an [`ObjectDictionaryBuilder`](super::ObjectDictionaryBuilder),
/// then shared (behind an `Arc<tokio::sync::Mutex<_>>`) between the SDO
/// server, the local application, and any PDO mapping that reads or writes
/// through it.
#[derive(Debug)]
pub struct ObjectDictionary {
    pub(crate) node_id: u8,
    pub(crate) index_to_object: HashMap<u16, ObjectType>,
    pub(crate) name_to_index: HashMap<String, u16>,
}

impl ObjectDictionary {
    /// The node ID this dictionary was built for.
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Wrap this dictionary for sharing across the SDO server and clients.
    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    /// Look up a sub-entry by (index, subindex).
    pub fn get(&self, index: u16, subindex: u8) -> Option<&Variable> {
        self.index_to_object.get(&index)?.get(subindex)
    }

    /// Look up a sub-entry by (index, subindex), mutably.
    pub fn get_mut(&mut self, index: u16, subindex: u8) -> Option<&mut Variable> {
        self.index_to_object.get_mut(&index)?.get_mut(subindex)
    }

    /// Look up the top-level object at `index`.
    pub fn get_object(&self, index: u16) -> Option<&ObjectType> {
        self.index_to_object.get(&index)
    }

    /// Look up the top-level object at `index`, mutably.
    pub fn get_object_mut(&mut self, index: u16) -> Option<&mut ObjectType> {
        self.index_to_object.get_mut(&index)
    }

    /// Look up a top-level object by name.
    pub fn get_object_by_name(&self, name: &str) -> Option<&ObjectType> {
        let index = *self.name_to_index.get(name)?;
        self.index_to_object.get(&index)
    }

    /// Insert or replace a top-level object.
    pub fn push(&mut self, index: u16, name: impl Into<String>, object: ObjectType) {
        self.name_to_index.insert(name.into(), index);
        self.index_to_object.insert(index, object);
    }

    /// Set the value of a sub-entry directly, bypassing SDO access checks.
    ///
    /// Used by the local application and by ambient services (NMT, PDO
    /// mapping) that touch the dictionary without going through the SDO
    /// access model.
    pub fn set(&mut self, index: u16, subindex: u8, data: &[u8]) -> Result<(), OdError> {
        let var = self.get_mut(index, subindex)
            .ok_or(OdError::SubindexNotPresent { index, subindex })?;
        var.value.set_data(data.to_vec());
        Ok(())
    }

    /// Read `buf.len()` bytes (or fewer, if exhausted) from `(index, subindex)`
    /// starting at `offset`, honoring SDO read access and early-NUL
    /// termination of `STR` entries.
    pub fn read_entry(&self, index: u16, subindex: u8, offset: usize, buf: &mut [u8]) -> Result<(usize, StreamStatus), OdError> {
        let object = self.index_to_object.get(&index)
            .ok_or(OdError::IndexNotPresent { index })?;
        let var = object.get(subindex)
            .ok_or(OdError::SubindexNotPresent { index, subindex })?;
        if !var.attribute.sdo_r {
            return Err(OdError::ReadNotSupported { index, subindex });
        }

        let source = var.value.as_slice();
        let source = if var.attribute.str_type {
            let nul = source.iter().position(|&b| b == 0).unwrap_or(source.len());
            &source[..nul]
        } else {
            source
        };

        if offset >= source.len() {
            return Ok((0, StreamStatus::Done));
        }
        let remaining = &source[offset..];
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        let status = if offset + n >= source.len() { StreamStatus::Done } else { StreamStatus::Partial };
        Ok((n, status))
    }

    /// Write `buf` into `(index, subindex)` at `offset`, honoring SDO write
    /// access, declared length limits, and min/max bounds.
    ///
    /// `is_last` must be true on the chunk that completes the download;
    /// variable-length entries (`STR`, `DOMAIN`) only learn their final
    /// length at that point.
    pub fn write_entry(&mut self, index: u16, subindex: u8, offset: usize, buf: &[u8], is_last: bool) -> Result<(usize, StreamStatus), OdError> {
        let object = self.index_to_object.get_mut(&index)
            .ok_or(OdError::IndexNotPresent { index })?;
        let var = object.get_mut(subindex)
            .ok_or(OdError::SubindexNotPresent { index, subindex })?;
        if !var.attribute.sdo_w {
            return Err(OdError::WriteNotSupported { index, subindex });
        }

        let fixed_length = var.data_length;
        let end = offset + buf.len();
        if fixed_length > 0 && end > fixed_length {
            return Err(OdError::DataTooLong { index, subindex, expected: fixed_length, actual: end });
        }

        let mut data = std::mem::take(&mut var.value).into_bytes();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);

        if is_last && fixed_length > 0 && end < fixed_length {
            if var.attribute.str_type {
                // STR entries accept a short closing write; pad with NULs
                // (one or two, to satisfy the declared length) instead of erroring.
                data.resize(fixed_length, 0);
            } else {
                var.value.set_data(data);
                return Err(OdError::DataTooShort { index, subindex, expected: fixed_length, actual: end });
            }
        }
        var.value.set_data(data);

        let status = if fixed_length > 0 {
            if end >= fixed_length || is_last { StreamStatus::Done } else { StreamStatus::Partial }
        } else if is_last {
            StreamStatus::Done
        } else {
            StreamStatus::Partial
        };

        Ok((buf.len(), status))
    }
}

/// Open a [`Streamer`] over `(index, subindex)` of a shared dictionary.
///
/// A free function rather than a method so it can be called without
/// holding `&mut ObjectDictionary` across the `.await`.
pub async fn open_streamer(od: &Arc<Mutex<ObjectDictionary>>, index: u16, subindex: u8) -> Result<Streamer, OdError> {
    let dict = od.lock().await;
    let object = dict.index_to_object.get(&index).ok_or(OdError::IndexNotPresent { index })?;
    let var = object.get(subindex).ok_or(OdError::SubindexNotPresent { index, subindex })?;
    let attribute = var.attribute;
    let data_length = if attribute.str_type {
        var.value.as_slice().iter().position(|&b| b == 0).unwrap_or(var.value.len())
    } else if var.data_length > 0 {
        var.data_length
    } else {
        var.value.len()
    };
    drop(dict);
    Ok(Streamer::new(od.clone(), index, subindex, data_length, attribute))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dictionary::{Attribute, DataType, ObjectDictionaryBuilder, Value, Variable};

    fn sample() -> ObjectDictionary {
        ObjectDictionaryBuilder::new(5)
            .variable(0x2000, "Counter", DataType::Unsigned32, Attribute::READ_WRITE, Value::from_bytes(&[0; 4]))
            .variable(0x2001, "Name", DataType::VisibleString, Attribute::READ_WRITE.with_str(), Value::from_bytes(b"abc\0\0"))
            .build()
    }

    #[test]
    fn read_entry_reports_done_when_fully_consumed() {
        let od = sample();
        let mut buf = [0u8; 4];
        let (n, status) = od.read_entry(0x2000, 0, 0, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(status, StreamStatus::Done);
    }

    #[test]
    fn read_entry_truncates_string_at_nul() {
        let od = sample();
        let mut buf = [0u8; 8];
        let (n, status) = od.read_entry(0x2001, 0, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc");
        assert_eq!(status, StreamStatus::Done);
    }

    #[test]
    fn write_entry_rejects_overlong_fixed_type() {
        let mut od = sample();
        let err = od.write_entry(0x2000, 0, 0, &[0; 5], true).unwrap_err();
        assert!(matches!(err, OdError::DataTooLong { .. }));
    }

    #[test]
    fn write_entry_rejects_unknown_index() {
        let mut od = sample();
        let err = od.write_entry(0x3000, 0, 0, &[0], true).unwrap_err();
        assert!(matches!(err, OdError::IndexNotPresent { index: 0x3000 }));
    }

    #[test]
    fn write_entry_honors_explicit_data_length_on_str_entries() {
        // VisibleString has no fixed size of its own; a declared `data_length`
        // must still cap how many bytes a download may write.
        let mut od = ObjectDictionaryBuilder::new(5)
            .object(0x2002, "Label", ObjectType::Variable(
                Variable::new(0x2002, 0, "Label", DataType::VisibleString, Attribute::READ_WRITE.with_str())
                    .with_value(Value::from_bytes(b"\0\0\0\0"))
                    .with_data_length(4),
            ))
            .build();
        let err = od.write_entry(0x2002, 0, 0, b"abcde", true).unwrap_err();
        assert!(matches!(err, OdError::DataTooLong { .. }));

        let (n, status) = od.write_entry(0x2002, 0, 0, b"ab", false).unwrap();
        assert_eq!(n, 2);
        assert_eq!(status, StreamStatus::Partial);
    }

    #[test]
    fn write_entry_pads_short_closing_write_on_str_entries() {
        let mut od = ObjectDictionaryBuilder::new(5)
            .object(0x2002, "Label", ObjectType::Variable(
                Variable::new(0x2002, 0, "Label", DataType::VisibleString, Attribute::READ_WRITE.with_str())
                    .with_value(Value::from_bytes(b"\0\0\0\0"))
                    .with_data_length(4),
            ))
            .build();
        let (n, status) = od.write_entry(0x2002, 0, 0, b"ab", true).unwrap();
        assert_eq!(n, 2);
        assert_eq!(status, StreamStatus::Done);
        assert_eq!(od.get(0x2002, 0).unwrap().value.as_slice(), b"ab\0\0");
    }

    #[test]
    fn write_entry_rejects_short_closing_write_on_fixed_non_str_entries() {
        let mut od = sample();
        let err = od.write_entry(0x2000, 0, 0, &[1, 2], true).unwrap_err();
        assert!(matches!(err, OdError::DataTooShort { expected: 4, actual: 2, .. }));
    }
}
