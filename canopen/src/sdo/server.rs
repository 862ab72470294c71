//! Stateful SDO server: the responder side of the expedited, segmented and
//! block-mode wire protocols.
//!
//! Unlike the client, the server never juggles more than one transfer per
//! instance (concurrent transfers on the same server are out of scope), so
//! each transfer is handled by a single straight-line `async fn` rather than
//! by an explicit state enum: every `await` point in that function *is* one
//! of the named protocol states.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use can_socket::CanFrame;
use tokio::sync::Mutex as AsyncMutex;

use crate::dictionary::{ObjectDictionary, Streamer, StreamStatus};
use crate::nmt::NmtState;
use crate::{CanOpenSocket, NodeId, ObjectIndex};

use super::block::{
	make_blk_end_ack, make_download_blk_initiate_response, make_subblock_ack,
	make_subblock_frame, make_upload_blk_initiate_response, parse_blk_end_request,
	parse_download_blk_initiate_request, parse_subblock_ack, parse_subblock_frame,
	parse_upload_blk_initiate_request, parse_upload_blk_start,
};
use super::{AbortReason, MalformedResponse, SdoAddress, SdoError, PROTOCOL_SWITCH_THRESHOLD};

/// How long the server waits for the next frame of an in-progress transfer
/// before aborting it with [`AbortReason::SdoProtocolTimedOut`].
const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(1);

/// A transfer never starts; this is effectively "forever" for the purposes
/// of [`SdoServer::process`], which otherwise blocks on the next inbound
/// frame or the caller's cancellation signal.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A stateful SDO server bound to one local node.
#[derive(Debug)]
pub struct SdoServer {
	local_node_id: NodeId,
	sdo: SdoAddress,
	od: Arc<AsyncMutex<ObjectDictionary>>,
	timeout: Duration,
	nmt_state: AsyncMutex<NmtState>,
	lock: AsyncMutex<()>,
}

impl SdoServer {
	/// Create a server listening on the standard `0x600 + node_id` /
	/// `0x580 + node_id` channel.
	pub fn new(od: Arc<AsyncMutex<ObjectDictionary>>, local_node_id: NodeId, timeout: Duration) -> Self {
		Self {
			local_node_id,
			sdo: SdoAddress::standard(),
			od,
			timeout,
			nmt_state: AsyncMutex::new(NmtState::PreOperational),
			lock: AsyncMutex::new(()),
		}
	}

	/// Create a server listening on a non-default channel read from a local
	/// SDO server parameter record (object `0x1200 + n`, CiA 301 section 7.2.3.3).
	pub async fn with_config_entry(
		od: Arc<AsyncMutex<ObjectDictionary>>,
		local_node_id: NodeId,
		timeout: Duration,
		config_index: u16,
	) -> Result<Self, SdoError> {
		let (cob_c2s, cob_s2c) = {
			let dict = od.lock().await;
			let read_u32 = |subindex| -> u32 {
				dict.get(config_index, subindex)
					.map(|var| {
						let bytes = var.value.as_slice();
						let mut buf = [0u8; 4];
						buf[..bytes.len().min(4)].copy_from_slice(&bytes[..bytes.len().min(4)]);
						u32::from_le_bytes(buf)
					})
					.unwrap_or(0)
			};
			// CiA 301 §7.2.3.3: subindex 1 is COB-ID client->server, subindex 2 is COB-ID server->client.
			(read_u32(1), read_u32(2))
		};

		let s2c_valid = cob_s2c & 0x8000_0000 == 0;
		let c2s_valid = cob_c2s & 0x8000_0000 == 0;
		let s2c = if s2c_valid { cob_s2c & 0x7FF } else { 0x580 + u32::from(local_node_id) };
		let c2s = if c2s_valid { cob_c2s & 0x7FF } else { 0x600 + u32::from(local_node_id) };

		let sdo = SdoAddress::new(c2s as u16, s2c as u16)
			.map_err(|_| SdoError::TransferAborted(super::TransferAborted { reason: Ok(AbortReason::GeneralError) }))?;

		Ok(Self {
			local_node_id,
			sdo,
			od,
			timeout,
			nmt_state: AsyncMutex::new(NmtState::PreOperational),
			lock: AsyncMutex::new(()),
		})
	}

	/// Update the NMT state the server reports for access checks that depend on it.
	pub async fn set_nmt_state(&self, state: NmtState) {
		*self.nmt_state.lock().await = state;
	}

	/// Send an abort frame for `object`, ending whatever transfer is in progress.
	pub async fn abort(&self, bus: &mut CanOpenSocket, object: ObjectIndex, reason: AbortReason) -> Result<(), SdoError> {
		let _guard = self.lock.lock().await;
		self.send_abort(bus, object, reason).await
	}

	async fn send_abort(&self, bus: &mut CanOpenSocket, object: ObjectIndex, reason: AbortReason) -> Result<(), SdoError> {
		let reason_bytes = u32::from(reason).to_le_bytes();
		let index = object.index.to_le_bytes();
		let data = [0x80, index[0], index[1], object.subindex, reason_bytes[0], reason_bytes[1], reason_bytes[2], reason_bytes[3]];
		let frame = CanFrame::new(self.sdo.response_id(self.local_node_id), data);
		bus.send_frame(&frame).await.map_err(SdoError::SendFailed)
	}

	async fn recv(&self, bus: &mut CanOpenSocket, timeout: Duration) -> Result<CanFrame, SdoError> {
		bus.recv_new_by_can_id(self.sdo.command_id(self.local_node_id), timeout).await
			.map_err(SdoError::RecvFailed)?
			.ok_or(SdoError::Timeout)
	}

	/// Run the server: wait for the next SDO command and service it, until
	/// `cancel` resolves. In-flight transfers are dropped silently on
	/// cancellation, without emitting an abort frame.
	pub async fn process<C: Future<Output = ()>>(&self, bus: &mut CanOpenSocket, cancel: C) -> Result<(), SdoError> {
		tokio::pin!(cancel);
		loop {
			let frame = tokio::select! {
				_ = &mut cancel => return Ok(()),
				frame = self.recv(bus, IDLE_TIMEOUT) => frame?,
			};

			let _guard = self.lock.lock().await;
			if let Err(error) = self.handle_initiate(bus, &frame).await {
				log::debug!("SDO transfer failed: {error}");
			}
		}
	}

	async fn handle_initiate(&self, bus: &mut CanOpenSocket, frame: &CanFrame) -> Result<(), SdoError> {
		let data: [u8; 8] = frame.data().try_into()
			.map_err(|_| MalformedResponse::WrongFrameSize(frame.data().len()))?;
		let cs = data[0];

		if cs == 0x80 {
			log::debug!("Ignoring abort frame with no transfer in progress");
			return Ok(());
		}

		let object = ObjectIndex::new(u16::from_le_bytes([data[1], data[2]]), data[3]);
		log::debug!("SDO server received command 0x{cs:02X} for index 0x{:04X}:{:02X}", object.index, object.subindex);

		if cs & 0xE0 == 0x20 {
			self.handle_download_initiate(bus, object, &data).await
		} else if cs == 0x40 {
			self.handle_upload_initiate(bus, object).await
		} else if cs & 0xF9 == 0xC0 {
			self.handle_download_blk_initiate(bus, object, &data).await
		} else if cs & 0xFB == 0xA0 {
			self.handle_upload_blk_initiate(bus, object, &data).await
		} else {
			self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await
		}
	}

	async fn open_streamer(&self, object: ObjectIndex) -> Result<Streamer, AbortReason> {
		crate::dictionary::open_streamer(&self.od, object.index, object.subindex).await
			.map_err(|e| e.abort_reason())
	}

	/// Handle a (possibly expedited) download initiate request.
	async fn handle_download_initiate(&self, bus: &mut CanOpenSocket, object: ObjectIndex, data: &[u8; 8]) -> Result<(), SdoError> {
		let expedited = data[0] & 0x02 != 0;
		let size_set = data[0] & 0x01 != 0;
		let n = (data[0] >> 2) & 0x03;

		let mut streamer = match self.open_streamer(object).await {
			Ok(s) => s,
			Err(reason) => return self.send_abort(bus, object, reason).await,
		};

		if expedited {
			let len = if size_set { 4 - n as usize } else { 4 };
			if let Err(reason) = self.write_chunk(&mut streamer, &data[4..][..len], true).await {
				return self.send_abort(bus, object, reason).await;
			}
			let response = CanFrame::new(self.sdo.response_id(self.local_node_id), [0x60, data[1], data[2], data[3], 0, 0, 0, 0]);
			return bus.send_frame(&response).await.map_err(SdoError::SendFailed);
		}

		// Segmented download.
		let response = CanFrame::new(self.sdo.response_id(self.local_node_id), [0x60, data[1], data[2], data[3], 0, 0, 0, 0]);
		bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

		let mut toggle = false;
		loop {
			let frame = match self.recv(bus, DEFAULT_TRANSFER_TIMEOUT).await {
				Ok(frame) => frame,
				Err(SdoError::Timeout) => return self.send_abort(bus, object, AbortReason::SdoProtocolTimedOut).await,
				Err(e) => return Err(e),
			};
			let data: [u8; 8] = frame.data().try_into()
				.map_err(|_| MalformedResponse::WrongFrameSize(frame.data().len()))?;
			if data[0] == 0x80 {
				log::debug!("Client aborted segmented download");
				return Ok(());
			}
			if data[0] & 0xE0 != 0x00 {
				return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await;
			}
			let frame_toggle = data[0] & 0x10 != 0;
			if frame_toggle != toggle {
				return self.send_abort(bus, object, AbortReason::ToggleBitNotAlternated).await;
			}
			let n = (data[0] >> 1) & 0x07;
			let last = data[0] & 0x01 != 0;
			let len = 7 - n as usize;

			if let Err(reason) = self.write_chunk(&mut streamer, &data[1..][..len], last).await {
				return self.send_abort(bus, object, reason).await;
			}

			let response = CanFrame::new(self.sdo.response_id(self.local_node_id), [0x20 | u8::from(toggle) << 4, 0, 0, 0, 0, 0, 0, 0]);
			bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

			if last {
				return Ok(());
			}
			toggle = !toggle;
		}
	}

	/// Write a chunk to the streamer, mapping `OdError` to an `AbortReason`.
	async fn write_chunk(&self, streamer: &mut Streamer, data: &[u8], is_last: bool) -> Result<StreamStatus, AbortReason> {
		streamer.write(data, is_last).await.map(|(_, status)| status).map_err(|e| e.abort_reason())
	}

	async fn handle_upload_initiate(&self, bus: &mut CanOpenSocket, object: ObjectIndex) -> Result<(), SdoError> {
		let mut streamer = match self.open_streamer(object).await {
			Ok(s) => s,
			Err(reason) => return self.send_abort(bus, object, reason).await,
		};

		let index = object.index.to_le_bytes();

		if streamer.data_length() > 0 && streamer.data_length() <= 4 {
			let mut buf = [0u8; 4];
			let (n, _status) = match streamer.read(&mut buf[..streamer.data_length()]).await {
				Ok(x) => x,
				Err(e) => return self.send_abort(bus, object, e.abort_reason()).await,
			};
			let unused = 4 - n as u8;
			let cs = 0x40 | unused << 2 | 0x03;
			let response = CanFrame::new(self.sdo.response_id(self.local_node_id), [cs, index[0], index[1], object.subindex, buf[0], buf[1], buf[2], buf[3]]);
			return bus.send_frame(&response).await.map_err(SdoError::SendFailed);
		}

		// Segmented upload: announce the size if known, then stream 7-byte segments.
		let size = streamer.data_length() as u32;
		let size_bytes = size.to_le_bytes();
		let size_known = streamer.data_length() > 0;
		let cs = 0x40 | u8::from(size_known);
		let response = CanFrame::new(
			self.sdo.response_id(self.local_node_id),
			[cs, index[0], index[1], object.subindex, size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]],
		);
		bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

		let mut toggle = false;
		loop {
			let frame = match self.recv(bus, DEFAULT_TRANSFER_TIMEOUT).await {
				Ok(frame) => frame,
				Err(SdoError::Timeout) => return self.send_abort(bus, object, AbortReason::SdoProtocolTimedOut).await,
				Err(e) => return Err(e),
			};
			let data: [u8; 8] = frame.data().try_into()
				.map_err(|_| MalformedResponse::WrongFrameSize(frame.data().len()))?;
			if data[0] == 0x80 {
				log::debug!("Client aborted segmented upload");
				return Ok(());
			}
			if data[0] & 0xE0 != 0x60 {
				return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await;
			}
			let frame_toggle = data[0] & 0x10 != 0;
			if frame_toggle != toggle {
				return self.send_abort(bus, object, AbortReason::ToggleBitNotAlternated).await;
			}

			let mut chunk = [0u8; 7];
			let (n, status) = match streamer.read(&mut chunk).await {
				Ok(x) => x,
				Err(e) => return self.send_abort(bus, object, e.abort_reason()).await,
			};
			let last = status == StreamStatus::Done;
			let unused = 7 - n as u8;
			let cs = u8::from(toggle) << 4 | unused << 1 | u8::from(last);
			let mut response_data = [0u8; 8];
			response_data[0] = cs;
			response_data[1..1 + n].copy_from_slice(&chunk[..n]);
			let response = CanFrame::new(self.sdo.response_id(self.local_node_id), response_data);
			bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

			if last {
				return Ok(());
			}
			toggle = !toggle;
		}
	}

	async fn handle_download_blk_initiate(&self, bus: &mut CanOpenSocket, object: ObjectIndex, data: &[u8; 8]) -> Result<(), SdoError> {
		let (_object, size) = match parse_download_blk_initiate_request(&CanFrame::new(self.sdo.command_id(self.local_node_id), *data)) {
			Ok(x) => x,
			Err(_) => return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await,
		};

		let mut streamer = match self.open_streamer(object).await {
			Ok(s) => s,
			Err(reason) => return self.send_abort(bus, object, reason).await,
		};

		if let Some(size) = size {
			if streamer.data_length() > 0 && size as usize > streamer.data_length() {
				return self.send_abort(bus, object, AbortReason::LengthTooHigh).await;
			}
		}

		let block_size = 127u8;
		let response = make_download_blk_initiate_response(self.sdo.response_id(self.local_node_id), object, block_size);
		bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

		let mut crc = crate::crc::Crc16::new();
		let mut last_seqno = 0u8;
		let mut buffer: Vec<u8> = Vec::new();
		let mut block_size = block_size;
		// Set once the final sub-block frame has been consumed and acked:
		// only then is the next frame allowed to be parsed as an end
		// request. A last-sub-block data frame's command byte (`0x80 | seqno`)
		// can alias the end-request pattern (`cs & 0xE3 == 0xC1`) for eight
		// seqno values, so the two parsers must never both be tried against
		// the same frame.
		let mut awaiting_end = false;

		loop {
			let frame = match self.recv(bus, DEFAULT_TRANSFER_TIMEOUT).await {
				Ok(frame) => frame,
				Err(SdoError::Timeout) => return self.send_abort(bus, object, AbortReason::SdoProtocolTimedOut).await,
				Err(e) => return Err(e),
			};
			if frame.data().first() == Some(&0x80) {
				log::debug!("Client aborted block download");
				return Ok(());
			}

			if awaiting_end {
				let (no_data, client_crc) = match parse_blk_end_request(&frame) {
					Ok(x) => x,
					Err(_) => return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await,
				};
				let no_data = usize::from(no_data);
				buffer.truncate(buffer.len().saturating_sub(no_data));
				crc.update(&buffer);
				if let Err(reason) = self.write_chunk(&mut streamer, &buffer, true).await {
					return self.send_abort(bus, object, reason).await;
				}
				if crc.finish() != client_crc {
					return self.send_abort(bus, object, AbortReason::CrcError).await;
				}
				let ack = make_blk_end_ack(self.sdo.response_id(self.local_node_id));
				return bus.send_frame(&ack).await.map_err(SdoError::SendFailed);
			}

			let (seqno, last, payload) = match parse_subblock_frame(&frame) {
				Ok(x) => x,
				Err(_) => return self.send_abort(bus, object, AbortReason::InvalidSequenceNumber).await,
			};

			if seqno == last_seqno + 1 {
				buffer.extend_from_slice(&payload);
				last_seqno = seqno;
			} else if seqno == last_seqno {
				// Duplicate frame from a retransmit; already accounted for.
				continue;
			} else {
				// Out of order and not a duplicate: report where we actually are.
				let ack = make_subblock_ack(self.sdo.response_id(self.local_node_id), last_seqno, block_size);
				bus.send_frame(&ack).await.map_err(SdoError::SendFailed)?;
				continue;
			}

			if last || last_seqno == block_size {
				// The final sub-block's data stays buffered until the end
				// request arrives, since only then do we know how many
				// trailing bytes are `no_data` padding rather than payload.
				if !last {
					crc.update(&buffer);
					if let Err(reason) = self.write_chunk(&mut streamer, &buffer, false).await {
						return self.send_abort(bus, object, reason).await;
					}
					buffer.clear();
				}
				let next_block_size = 127u8;
				let ack = make_subblock_ack(self.sdo.response_id(self.local_node_id), last_seqno, next_block_size);
				bus.send_frame(&ack).await.map_err(SdoError::SendFailed)?;
				block_size = next_block_size;
				last_seqno = 0;
			}

			if last {
				// The end request is now the only legal next frame.
				awaiting_end = true;
			}
		}
	}

	async fn handle_upload_blk_initiate(&self, bus: &mut CanOpenSocket, object: ObjectIndex, data: &[u8; 8]) -> Result<(), SdoError> {
		let (_object, client_block_size, pst) = match parse_upload_blk_initiate_request(&CanFrame::new(self.sdo.command_id(self.local_node_id), *data)) {
			Ok(x) => x,
			Err(_) => return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await,
		};

		let mut streamer = match self.open_streamer(object).await {
			Ok(s) => s,
			Err(reason) => return self.send_abort(bus, object, reason).await,
		};

		// The client's PST is authoritative: a client sending a low PST to
		// force block mode even for small objects must be honored, not
		// floored to our own default threshold. `pst == 0` means "unspecified"
		// and falls back to the protocol default.
		let pst = if pst == 0 { PROTOCOL_SWITCH_THRESHOLD } else { pst };
		let size = streamer.data_length();
		if size > 0 && size <= usize::from(pst) {
			return self.switch_to_expedited_or_segmented_upload(bus, object, &mut streamer).await;
		}

		let response = make_upload_blk_initiate_response(self.sdo.response_id(self.local_node_id), object, (size > 0).then_some(size as u32));
		bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

		let start = match self.recv(bus, DEFAULT_TRANSFER_TIMEOUT).await {
			Ok(frame) => frame,
			Err(SdoError::Timeout) => return self.send_abort(bus, object, AbortReason::SdoProtocolTimedOut).await,
			Err(e) => return Err(e),
		};
		if parse_upload_blk_start(&start).is_err() {
			return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await;
		}

		let mut crc = crate::crc::Crc16::new();
		let mut block_size = client_block_size.max(1);
		let mut sent_total = 0usize;

		loop {
			let mut chunk = [0u8; 7];
			let mut seqno_sent = 0u8;
			let mut last_in_transfer = false;
			for i in 0..block_size {
				let (n, status) = match streamer.read(&mut chunk).await {
					Ok(x) => x,
					Err(e) => return self.send_abort(bus, object, e.abort_reason()).await,
				};
				crc.update(&chunk[..n]);
				sent_total += n;
				last_in_transfer = status == StreamStatus::Done;
				let seqno = super::SeqNo::new(i + 1).expect("block size bounded to 127");
				let frame = make_subblock_frame(self.sdo.response_id(self.local_node_id), seqno, last_in_transfer, &chunk[..n]);
				bus.send_frame(&frame).await.map_err(SdoError::SendFailed)?;
				seqno_sent = i + 1;
				if last_in_transfer {
					break;
				}
			}

			let ack = match self.recv(bus, DEFAULT_TRANSFER_TIMEOUT).await {
				Ok(frame) => frame,
				Err(SdoError::Timeout) => return self.send_abort(bus, object, AbortReason::SdoProtocolTimedOut).await,
				Err(e) => return Err(e),
			};
			let (ack_seq, next_block_size) = match parse_subblock_ack(&ack) {
				Ok(x) => x,
				Err(_) => return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await,
			};

			if ack_seq > seqno_sent {
				return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await;
			}
			if ack_seq < seqno_sent {
				let rewind = usize::from(seqno_sent - ack_seq) * 7;
				streamer.rewind(rewind.min(sent_total));
				sent_total -= rewind.min(sent_total);
				block_size = next_block_size.max(1);
				continue;
			}

			if last_in_transfer {
				let no_data = (7 - sent_total % 7) % 7;
				let no_data = if sent_total == 0 { 0 } else { no_data };
				let crc_bytes = crc.finish().to_le_bytes();
				let end = CanFrame::new(
					self.sdo.response_id(self.local_node_id),
					[0xC1 | (no_data as u8) << 2, crc_bytes[0], crc_bytes[1], 0, 0, 0, 0, 0],
				);
				bus.send_frame(&end).await.map_err(SdoError::SendFailed)?;
				let ack = match self.recv(bus, self.timeout).await {
					Ok(frame) => frame,
					Err(SdoError::Timeout) => return self.send_abort(bus, object, AbortReason::SdoProtocolTimedOut).await,
					Err(e) => return Err(e),
				};
				if ack.data().first() != Some(&0xA1) {
					return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await;
				}
				return Ok(());
			}

			block_size = next_block_size.max(1);
		}
	}

	/// Downgrade a requested block upload to segmented or expedited, because
	/// the object is small enough that block mode isn't worth the overhead.
	async fn switch_to_expedited_or_segmented_upload(&self, bus: &mut CanOpenSocket, object: ObjectIndex, streamer: &mut Streamer) -> Result<(), SdoError> {
		let index = object.index.to_le_bytes();
		let size = streamer.data_length();
		if size <= 4 {
			let mut buf = [0u8; 4];
			let (n, _status) = match streamer.read(&mut buf[..size]).await {
				Ok(x) => x,
				Err(e) => return self.send_abort(bus, object, e.abort_reason()).await,
			};
			let unused = 4 - n as u8;
			let cs = 0x40 | unused << 2 | 0x03;
			let response = CanFrame::new(self.sdo.response_id(self.local_node_id), [cs, index[0], index[1], object.subindex, buf[0], buf[1], buf[2], buf[3]]);
			return bus.send_frame(&response).await.map_err(SdoError::SendFailed);
		}

		let size_bytes = (size as u32).to_le_bytes();
		let response = CanFrame::new(self.sdo.response_id(self.local_node_id), [0x41, index[0], index[1], object.subindex, size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]);
		bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

		let mut toggle = false;
		loop {
			let frame = match self.recv(bus, DEFAULT_TRANSFER_TIMEOUT).await {
				Ok(frame) => frame,
				Err(SdoError::Timeout) => return self.send_abort(bus, object, AbortReason::SdoProtocolTimedOut).await,
				Err(e) => return Err(e),
			};
			let data: [u8; 8] = frame.data().try_into()
				.map_err(|_| MalformedResponse::WrongFrameSize(frame.data().len()))?;
			if data[0] == 0x80 {
				return Ok(());
			}
			if data[0] & 0xE0 != 0x60 {
				return self.send_abort(bus, object, AbortReason::InvalidOrUnknownCommandSpecifier).await;
			}
			let frame_toggle = data[0] & 0x10 != 0;
			if frame_toggle != toggle {
				return self.send_abort(bus, object, AbortReason::ToggleBitNotAlternated).await;
			}

			let mut chunk = [0u8; 7];
			let (n, status) = match streamer.read(&mut chunk).await {
				Ok(x) => x,
				Err(e) => return self.send_abort(bus, object, e.abort_reason()).await,
			};
			let last = status == StreamStatus::Done;
			let unused = 7 - n as u8;
			let cs = u8::from(toggle) << 4 | unused << 1 | u8::from(last);
			let mut response_data = [0u8; 8];
			response_data[0] = cs;
			response_data[1..1 + n].copy_from_slice(&chunk[..n]);
			let response = CanFrame::new(self.sdo.response_id(self.local_node_id), response_data);
			bus.send_frame(&response).await.map_err(SdoError::SendFailed)?;

			if last {
				return Ok(());
			}
			toggle = !toggle;
		}
	}
}
