use std::sync::Arc;

use tokio::sync::Mutex;

use super::{Attribute, ObjectDictionary, OdError};

/// The outcome of a single [`Streamer`] read or write call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StreamStatus {
    /// More bytes remain to be read, or the writer still expects more.
    Partial,
    /// The entry has been read or written in full.
    Done,
}

/// An incremental cursor over one `(index, subindex)` object dictionary entry.
///
/// A [`Streamer`] is the sole polymorphic boundary between the SDO engine and
/// the object dictionary: it is opened once per transfer, fed or drained in
/// whatever chunk sizes the active wire protocol produces (1..=7 bytes for
/// segmented transfers, up to `block_size * 7` for block transfers), and
/// dropped when the transfer reaches idle or abort.
#[derive(Debug)]
pub struct Streamer {
    od: Arc<Mutex<ObjectDictionary>>,
    index: u16,
    subindex: u8,
    data_offset: usize,
    data_length: usize,
    attribute: Attribute,
}

impl Streamer {
    pub(crate) fn new(
        od: Arc<Mutex<ObjectDictionary>>,
        index: u16,
        subindex: u8,
        data_length: usize,
        attribute: Attribute,
    ) -> Self {
        Self { od, index, subindex, data_offset: 0, data_length, attribute }
    }

    /// The index this streamer is bound to.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// The subindex this streamer is bound to.
    pub fn subindex(&self) -> u8 {
        self.subindex
    }

    /// Cumulative number of bytes processed so far.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Declared total length; `0` means unknown ahead of time (domains and
    /// unbounded strings report their true length only once [`StreamStatus::Done`]
    /// is reached).
    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// The entry's access attributes.
    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    /// Pull up to `buf.len()` bytes from the entry into `buf`.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(usize, StreamStatus), OdError> {
        let mut od = self.od.lock().await;
        let (n, status) = od.read_entry(self.index, self.subindex, self.data_offset, buf)?;
        drop(od);
        self.data_offset += n;
        if status == StreamStatus::Done && self.attribute.str_type {
            self.data_length = self.data_offset;
        }
        Ok((n, status))
    }

    /// Move the read cursor back by `n` bytes.
    ///
    /// Used by block upload to re-send a sub-block after the client
    /// acknowledges fewer segments than were sent.
    pub(crate) fn rewind(&mut self, n: usize) {
        self.data_offset = self.data_offset.saturating_sub(n);
    }

    /// Push `buf` into the entry at the current offset.
    ///
    /// `is_last` must be set on the final chunk of a download; it is the
    /// only way a variable-length (string or domain) entry learns that no
    /// more bytes are coming.
    pub async fn write(&mut self, buf: &[u8], is_last: bool) -> Result<(usize, StreamStatus), OdError> {
        let mut od = self.od.lock().await;
        let (n, status) = od.write_entry(self.index, self.subindex, self.data_offset, buf, is_last)?;
        drop(od);
        self.data_offset += n;
        Ok((n, status))
    }
}
