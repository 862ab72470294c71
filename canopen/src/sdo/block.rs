//! Wire encode/decode for the block-mode SDO download and upload protocols.
//!
//! Block mode always runs with CRC enabled in this implementation: bit 2
//! of every initiate command byte below is hard-set, matching the fixed
//! `0xC4`/`0xA4` values CiA 301 uses for the common case rather than
//! threading a `crc_enabled` flag through every call site.

use can_socket::{CanFrame, StandardId};

use crate::ObjectIndex;

use super::{AbortReason, SdoError, SeqNo, TransferAborted};

const CS_DOWNLOAD_BLK_INITIATE_REQ: u8 = 0xC4;
const CS_DOWNLOAD_BLK_INITIATE_RSP: u8 = 0xA4;
const CS_BLK_SUBBLOCK_ACK: u8 = 0xA2;
const CS_BLK_END_REQ_BASE: u8 = 0xC1;
const CS_BLK_END_ACK: u8 = 0xA1;
const CS_UPLOAD_BLK_INITIATE_REQ: u8 = 0xA4;
const CS_UPLOAD_BLK_INITIATE_RSP_BASE: u8 = 0xC0;
const CS_UPLOAD_BLK_START: u8 = 0xA3;
const CS_ABORT: u8 = 0x80;

/// Pull the abort reason out of a frame, if it is an abort frame.
fn check_abort(data: &[u8; 8]) -> Option<SdoError> {
	if data[0] != CS_ABORT {
		return None;
	}
	let reason = u32::from_le_bytes(data[4..8].try_into().unwrap());
	let reason = AbortReason::try_from(reason).map_err(|e| e.number);
	Some(SdoError::TransferAborted(TransferAborted { reason }))
}

fn frame_data(frame: &CanFrame) -> Result<[u8; 8], SdoError> {
	frame.data().try_into().map_err(|_| super::MalformedResponse::WrongFrameSize(frame.data().len()).into())
}

/// Build a "download block, initiate" request (client → server).
pub(crate) fn make_download_blk_initiate_request(id: StandardId, object: ObjectIndex, size: Option<u32>) -> CanFrame {
	let index = object.index.to_le_bytes();
	let size = size.unwrap_or(0).to_le_bytes();
	let cs = CS_DOWNLOAD_BLK_INITIATE_REQ | if size != [0; 4] { 0x02 } else { 0 };
	CanFrame::new(id, [cs, index[0], index[1], object.subindex, size[0], size[1], size[2], size[3]])
}

/// Parse a "download block, initiate" request (server side).
pub(crate) fn parse_download_blk_initiate_request(frame: &CanFrame) -> Result<(ObjectIndex, Option<u32>), SdoError> {
	let data = frame_data(frame)?;
	let object = ObjectIndex::new(u16::from_le_bytes([data[1], data[2]]), data[3]);
	let size_indicated = data[0] & 0x02 != 0;
	let size = size_indicated.then(|| u32::from_le_bytes(data[4..8].try_into().unwrap()));
	Ok((object, size))
}

/// Build a "download block, initiate" response (server → client).
pub(crate) fn make_download_blk_initiate_response(id: StandardId, object: ObjectIndex, block_size: u8) -> CanFrame {
	let index = object.index.to_le_bytes();
	CanFrame::new(id, [CS_DOWNLOAD_BLK_INITIATE_RSP, index[0], index[1], object.subindex, block_size, 0, 0, 0])
}

/// Parse a "download block, initiate" response (client side).
pub(crate) fn parse_download_blk_initiate_response(frame: &CanFrame) -> Result<u8, SdoError> {
	let data = frame_data(frame)?;
	if let Some(abort) = check_abort(&data) {
		return Err(abort);
	}
	if data[0] != CS_DOWNLOAD_BLK_INITIATE_RSP {
		return Err(super::MalformedResponse::UnexpectedCommandByte(data[0]).into());
	}
	Ok(data[4])
}

/// Build a sub-block data frame, shared by block download and block upload.
pub(crate) fn make_subblock_frame(id: StandardId, seqno: SeqNo, last: bool, data: &[u8]) -> CanFrame {
	let mut payload = [0u8; 8];
	payload[0] = super::with_last_block_frame(seqno.value(), last);
	let n = data.len().min(7);
	payload[1..1 + n].copy_from_slice(&data[..n]);
	CanFrame::new(id, payload)
}

/// Parse a sub-block data frame: returns `(seqno, last, data)`.
///
/// A seqno of `0` is possible on malformed/duplicate traffic and is
/// deliberately not rejected here; callers decide what to do with it.
pub(crate) fn parse_subblock_frame(frame: &CanFrame) -> Result<(u8, bool, [u8; 7]), SdoError> {
	let data = frame_data(frame)?;
	let seqno = data[0] & 0x7F;
	let last = super::is_last_block_frame(data[0]);
	let mut payload = [0u8; 7];
	payload.copy_from_slice(&data[1..8]);
	Ok((seqno, last, payload))
}

/// Build a sub-block ack frame, shared by block download and block upload.
pub(crate) fn make_subblock_ack(id: StandardId, ack_seq: u8, next_block_size: u8) -> CanFrame {
	CanFrame::new(id, [CS_BLK_SUBBLOCK_ACK, ack_seq, next_block_size, 0, 0, 0, 0, 0])
}

/// Parse a sub-block ack frame: returns `(ack_seq, next_block_size)`.
pub(crate) fn parse_subblock_ack(frame: &CanFrame) -> Result<(u8, u8), SdoError> {
	let data = frame_data(frame)?;
	if let Some(abort) = check_abort(&data) {
		return Err(abort);
	}
	if data[0] != CS_BLK_SUBBLOCK_ACK {
		return Err(super::MalformedResponse::UnexpectedCommandByte(data[0]).into());
	}
	Ok((data[1], data[2]))
}

/// Build a block end request, shared by block download and block upload.
pub(crate) fn make_blk_end_request(id: StandardId, no_data: u8, crc: u16) -> CanFrame {
	let crc = crc.to_le_bytes();
	CanFrame::new(id, [CS_BLK_END_REQ_BASE | (no_data << 2), crc[0], crc[1], 0, 0, 0, 0, 0])
}

/// Parse a block end request: returns `(no_data, crc)`.
pub(crate) fn parse_blk_end_request(frame: &CanFrame) -> Result<(u8, u16), SdoError> {
	let data = frame_data(frame)?;
	if let Some(abort) = check_abort(&data) {
		return Err(abort);
	}
	if data[0] & 0xE3 != CS_BLK_END_REQ_BASE {
		return Err(super::MalformedResponse::UnexpectedCommandByte(data[0]).into());
	}
	let no_data = (data[0] >> 2) & 0x07;
	let crc = u16::from_le_bytes([data[1], data[2]]);
	Ok((no_data, crc))
}

/// Build a block end ack frame, shared by block download and block upload.
pub(crate) fn make_blk_end_ack(id: StandardId) -> CanFrame {
	CanFrame::new(id, [CS_BLK_END_ACK, 0, 0, 0, 0, 0, 0, 0])
}

/// Parse a block end ack frame.
pub(crate) fn parse_blk_end_ack(frame: &CanFrame) -> Result<(), SdoError> {
	let data = frame_data(frame)?;
	if let Some(abort) = check_abort(&data) {
		return Err(abort);
	}
	if data[0] != CS_BLK_END_ACK {
		return Err(super::MalformedResponse::UnexpectedCommandByte(data[0]).into());
	}
	Ok(())
}

/// Build a "upload block, initiate" request (client → server).
pub(crate) fn make_upload_blk_initiate_request(id: StandardId, object: ObjectIndex, block_size: u8, pst: u8) -> CanFrame {
	let index = object.index.to_le_bytes();
	CanFrame::new(id, [CS_UPLOAD_BLK_INITIATE_REQ, index[0], index[1], object.subindex, block_size, pst, 0, 0])
}

/// Parse a "upload block, initiate" request (server side).
pub(crate) fn parse_upload_blk_initiate_request(frame: &CanFrame) -> Result<(ObjectIndex, u8, u8), SdoError> {
	let data = frame_data(frame)?;
	let object = ObjectIndex::new(u16::from_le_bytes([data[1], data[2]]), data[3]);
	Ok((object, data[4], data[5]))
}

/// The outcome of parsing a "upload block, initiate" response.
#[derive(Debug)]
pub(crate) enum UploadBlkInitiateResponse {
	/// The server accepted the block transfer.
	Block {
		object: ObjectIndex,
		size: Option<u32>,
	},
	/// The server switched to an expedited upload instead (payload below PST).
	Expedited {
		object: ObjectIndex,
		data: [u8; 4],
		len: usize,
	},
	/// The server switched to a segmented upload instead.
	Segmented {
		object: ObjectIndex,
		size: Option<u32>,
	},
}

/// Build a "upload block, initiate" response for the block-mode path (server → client).
pub(crate) fn make_upload_blk_initiate_response(id: StandardId, object: ObjectIndex, size: Option<u32>) -> CanFrame {
	let index = object.index.to_le_bytes();
	let cs = CS_UPLOAD_BLK_INITIATE_RSP_BASE | 0x04 | if size.is_some() { 0x02 } else { 0 };
	let size = size.unwrap_or(0).to_le_bytes();
	CanFrame::new(id, [cs, index[0], index[1], object.subindex, size[0], size[1], size[2], size[3]])
}

/// Parse a "upload block, initiate" response (client side), including the
/// protocol-switch cases where the server answers with a normal upload
/// initiate response instead of agreeing to block mode.
pub(crate) fn parse_upload_blk_initiate_response(frame: &CanFrame) -> Result<UploadBlkInitiateResponse, SdoError> {
	let data = frame_data(frame)?;
	if let Some(abort) = check_abort(&data) {
		return Err(abort);
	}
	let object = ObjectIndex::new(u16::from_le_bytes([data[1], data[2]]), data[3]);

	if data[0] & 0xE0 == CS_UPLOAD_BLK_INITIATE_RSP_BASE {
		let size_indicated = data[0] & 0x02 != 0;
		let size = size_indicated.then(|| u32::from_le_bytes(data[4..8].try_into().unwrap()));
		return Ok(UploadBlkInitiateResponse::Block { object, size });
	}

	if data[0] & 0xE0 == 0x40 {
		let expedited = data[0] & 0x02 != 0;
		let size_indicated = data[0] & 0x01 != 0;
		if expedited {
			let len = if size_indicated { 4 - usize::from((data[0] >> 2) & 0x03) } else { 4 };
			let mut payload = [0u8; 4];
			payload.copy_from_slice(&data[4..8]);
			return Ok(UploadBlkInitiateResponse::Expedited { object, data: payload, len });
		}
		let size = size_indicated.then(|| u32::from_le_bytes(data[4..8].try_into().unwrap()));
		return Ok(UploadBlkInitiateResponse::Segmented { object, size });
	}

	Err(super::MalformedResponse::UnexpectedCommandByte(data[0]).into())
}

/// Build a "upload block, start" frame (client → server).
pub(crate) fn make_upload_blk_start(id: StandardId) -> CanFrame {
	CanFrame::new(id, [CS_UPLOAD_BLK_START, 0, 0, 0, 0, 0, 0, 0])
}

/// Parse a "upload block, start" frame (server side).
pub(crate) fn parse_upload_blk_start(frame: &CanFrame) -> Result<(), SdoError> {
	let data = frame_data(frame)?;
	if let Some(abort) = check_abort(&data) {
		return Err(abort);
	}
	if data[0] != CS_UPLOAD_BLK_START {
		return Err(super::MalformedResponse::UnexpectedCommandByte(data[0]).into());
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use can_socket::CanId;

	fn id() -> StandardId {
		StandardId::new(0x600).unwrap()
	}

	#[test]
	fn download_blk_initiate_request_round_trips() {
		let object = ObjectIndex::new(0x2001, 3);
		let frame = make_download_blk_initiate_request(id(), object, Some(1025));
		assert_eq!(frame.id(), CanId::Standard(id()));
		let (parsed_object, size) = parse_download_blk_initiate_request(&frame).unwrap();
		assert_eq!(parsed_object.index, object.index);
		assert_eq!(parsed_object.subindex, object.subindex);
		assert_eq!(size, Some(1025));
	}

	#[test]
	fn download_blk_initiate_response_round_trips() {
		let object = ObjectIndex::new(0x2001, 3);
		let frame = make_download_blk_initiate_response(id(), object, 127);
		let block_size = parse_download_blk_initiate_response(&frame).unwrap();
		assert_eq!(block_size, 127);
	}

	#[test]
	fn subblock_frame_round_trips_with_last_bit() {
		let seqno = SeqNo::new(5).unwrap();
		let frame = make_subblock_frame(id(), seqno, true, &[1, 2, 3]);
		let (parsed_seqno, last, data) = parse_subblock_frame(&frame).unwrap();
		assert_eq!(parsed_seqno, 5);
		assert!(last);
		assert_eq!(&data[..3], &[1, 2, 3]);
		assert_eq!(&data[3..], &[0, 0, 0, 0]);
	}

	#[test]
	fn subblock_ack_round_trips() {
		let frame = make_subblock_ack(id(), 5, 64);
		let (ack_seq, next_block_size) = parse_subblock_ack(&frame).unwrap();
		assert_eq!(ack_seq, 5);
		assert_eq!(next_block_size, 64);
	}

	#[test]
	fn blk_end_request_round_trips() {
		let frame = make_blk_end_request(id(), 3, 0xBEEF);
		let (no_data, crc) = parse_blk_end_request(&frame).unwrap();
		assert_eq!(no_data, 3);
		assert_eq!(crc, 0xBEEF);
	}

	#[test]
	fn blk_end_ack_round_trips() {
		let frame = make_blk_end_ack(id());
		assert!(parse_blk_end_ack(&frame).is_ok());
	}

	#[test]
	fn upload_blk_initiate_response_parses_block_variant() {
		let object = ObjectIndex::new(0x2001, 0);
		let frame = make_upload_blk_initiate_response(id(), object, Some(1025));
		let parsed = parse_upload_blk_initiate_response(&frame).unwrap();
		assert!(matches!(parsed, UploadBlkInitiateResponse::Block { size: Some(1025), .. }));
	}

	#[test]
	fn upload_blk_initiate_response_parses_abort() {
		let reason = u32::from(AbortReason::ObjectDoesNotExist).to_le_bytes();
		let frame = CanFrame::new(id(), [0x80, 1, 0x20, 0, reason[0], reason[1], reason[2], reason[3]]);
		let err = parse_upload_blk_initiate_response(&frame).unwrap_err();
		assert!(matches!(err, SdoError::TransferAborted(_)));
	}
}
