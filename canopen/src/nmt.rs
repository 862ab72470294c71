//! Network Management (NMT) types and utilities.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::time::Duration;

use can_socket::{CanFrame, StandardId};
use crate::CanOpenSocket;

const NMT_COB_ID: u16 = 0x000;
const FUNCTION_HEARTBEAT: u16 = 0x700;

fn heartbeat_id(node_id: u8) -> StandardId {
	StandardId::new(FUNCTION_HEARTBEAT | u16::from(node_id))
		.expect("heartbeat COB-ID is always a valid 11-bit standard ID")
}

/// The NMT state of a CANopen device, as reported in its heartbeat byte.
#[repr(u8)]
#[derive(IntoPrimitive, TryFromPrimitive)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NmtState {
	/// The device is initializing. Reported once, as the "boot-up" message,
	/// when the device automatically proceeds to [`PreOperational`](Self::PreOperational).
	Initializing = 0x00,

	/// The device is stopped: only NMT and heartbeat/node guarding are processed.
	Stopped = 0x04,

	/// The device is fully operational: PDOs, SDOs, NMT and heartbeat are all processed.
	Operational = 0x05,

	/// The device has finished initialization and is waiting for a [`NmtCommand::Start`].
	PreOperational = 0x7F,
}

/// A command on the NMT "module control" service (COB-ID 0x000).
#[repr(u8)]
#[derive(IntoPrimitive, TryFromPrimitive)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NmtCommand {
	/// Command a device to go to the [`NmtState::Operational`] state.
	Start = 1,

	/// Command a device to go to the [`NmtState::Stopped`] state.
	Stop = 2,

	/// Command a device to go to the [`NmtState::PreOperational`] state.
	GoToPreOperational = 128,

	/// Command a device to reset and re-boot, ending up in [`NmtState::PreOperational`].
	Reset = 129,

	/// Command a device to reset only its communication parameters.
	ResetCommunication = 130,
}

impl NmtCommand {
	/// The heartbeat state a compliant device reports once it has processed this command.
	///
	/// `Reset` and `ResetCommunication` both end in a fresh boot-up message, which carries
	/// the same state byte as [`NmtState::Initializing`], before the device moves on to
	/// `PreOperational` on its own.
	fn expected_state(self) -> NmtState {
		match self {
			Self::Start => NmtState::Operational,
			Self::Stop => NmtState::Stopped,
			Self::GoToPreOperational => NmtState::PreOperational,
			Self::Reset => NmtState::Initializing,
			Self::ResetCommunication => NmtState::Initializing,
		}
	}
}

/// An error that can occur while sending an NMT command.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum NmtError {
	/// Failed to transmit the CAN frame.
	#[error("failed to send CAN frame: {0}")]
	SendFailed(std::io::Error),

	/// Failed to receive the heartbeat response.
	#[error("failed to receive CAN frame: {0}")]
	RecvFailed(std::io::Error),

	/// The timeout elapsed before the device reported its new state.
	#[error("timeout while waiting for heartbeat")]
	Timeout,

	/// The heartbeat frame did not carry a single, recognized state byte.
	#[error("received malformed heartbeat response")]
	MalformedResponse,

	/// The device reported a state other than the one the command expects.
	#[error(transparent)]
	UnexpectedState(#[from] UnexpectedState),
}

/// The device reported a state other than the one the command expects.
#[derive(Debug)]
#[derive(thiserror::Error)]
#[error("state change failed: device reports {actual} instead of {expected}")]
pub struct UnexpectedState {
	/// The state the command expects the device to report.
	pub expected: NmtState,

	/// The state actually reported by the device.
	pub actual: NmtState,
}

impl std::fmt::Display for NmtState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Initializing => write!(f, "initializing"),
			Self::Stopped => write!(f, "stopped"),
			Self::Operational => write!(f, "operational"),
			Self::PreOperational => write!(f, "pre-operational"),
		}
	}
}

impl std::fmt::Display for NmtCommand {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Start => write!(f, "start"),
			Self::Stop => write!(f, "stop"),
			Self::GoToPreOperational => write!(f, "go-to-pre-operational"),
			Self::Reset => write!(f, "reset"),
			Self::ResetCommunication => write!(f, "reset-communication"),
		}
	}
}

/// Send an NMT command to `node_id` and wait for its heartbeat to confirm the new state.
pub(crate) async fn send_nmt_command(
	bus: &mut CanOpenSocket,
	node_id: u8,
	command: NmtCommand,
	timeout: Duration,
) -> Result<(), NmtError> {
	log::debug!("Sending NMT command to node {node_id}: {command}");
	let command_frame = CanFrame::new(NMT_COB_ID, [command.into(), node_id]);
	bus.socket.send(&command_frame).await.map_err(NmtError::SendFailed)?;

	let expected = command.expected_state();
	let frame = bus.recv_new_by_can_id(heartbeat_id(node_id), timeout)
		.await
		.map_err(NmtError::RecvFailed)?
		.ok_or(NmtError::Timeout)?;
	let actual = parse_heartbeat(&frame)?;
	log::debug!("└─ Node {node_id} reports state: {actual}");
	if actual == expected {
		Ok(())
	} else {
		Err(UnexpectedState { expected, actual }.into())
	}
}

/// Parse a heartbeat frame's single data byte into an [`NmtState`].
pub fn parse_heartbeat(frame: &CanFrame) -> Result<NmtState, NmtError> {
	let &[byte] = frame.data() else {
		return Err(NmtError::MalformedResponse);
	};
	NmtState::try_from(byte).map_err(|_| NmtError::MalformedResponse)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn nmt_state_roundtrips_through_heartbeat_byte() {
		for state in [NmtState::Initializing, NmtState::Stopped, NmtState::Operational, NmtState::PreOperational] {
			let byte: u8 = state.into();
			assert_eq!(NmtState::try_from(byte).unwrap(), state);
		}
	}

	#[test]
	fn parse_heartbeat_rejects_wrong_length() {
		let frame = CanFrame::new(0x701u16, [0x05, 0x00]);
		assert!(matches!(parse_heartbeat(&frame), Err(NmtError::MalformedResponse)));
	}

	#[test]
	fn parse_heartbeat_rejects_unknown_state_byte() {
		let frame = CanFrame::new(0x701u16, [0x42]);
		assert!(matches!(parse_heartbeat(&frame), Err(NmtError::MalformedResponse)));
	}

	#[test]
	fn parse_heartbeat_accepts_known_state() {
		let frame = CanFrame::new(0x701u16, [0x7F]);
		assert_eq!(parse_heartbeat(&frame).unwrap(), NmtState::PreOperational);
	}

	#[test]
	fn expected_state_matches_cia301_table() {
		assert_eq!(NmtCommand::Start.expected_state(), NmtState::Operational);
		assert_eq!(NmtCommand::Stop.expected_state(), NmtState::Stopped);
		assert_eq!(NmtCommand::GoToPreOperational.expected_state(), NmtState::PreOperational);
		assert_eq!(NmtCommand::Reset.expected_state(), NmtState::Initializing);
		assert_eq!(NmtCommand::ResetCommunication.expected_state(), NmtState::Initializing);
	}
}
