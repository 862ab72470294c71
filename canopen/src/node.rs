//! Node assembly: binds one [`SdoServer`], a registry of [`SdoClient`]s and
//! the ambient periodic services to a single [`ObjectDictionary`] and bus.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use can_socket::tokio::CanSocket;
use tokio::sync::Mutex as AsyncMutex;

use crate::dictionary::ObjectDictionary;
use crate::nmt::{NmtCommand, NmtError, NmtState};
use crate::sdo::{SdoClient, SdoError, SdoServer};
use crate::{CanOpenSocket, NodeId};

/// A local CANopen node: a bus, an object dictionary, one SDO server and a
/// small registry of SDO clients for talking to other nodes.
///
/// This is the assembly point the rest of the crate is built around - the
/// individual pieces ([`SdoServer`], [`SdoClient`], [`crate::nmt`],
/// [`crate::pdo`]) are all usable on their own, but a node that both serves
/// its own object dictionary and masters other nodes' needs exactly this
/// combination.
#[allow(missing_debug_implementations)]
pub struct CanOpenNode {
	local_node_id: NodeId,
	bus: CanOpenSocket,
	od: Arc<AsyncMutex<ObjectDictionary>>,
	server: SdoServer,
	clients: HashMap<NodeId, SdoClient>,
	default_timeout: Duration,
}

impl CanOpenNode {
	/// Create a node listening on the standard SDO server channel
	/// (`0x600 + node_id` / `0x580 + node_id`).
	pub fn new(socket: CanSocket, od: ObjectDictionary, local_node_id: NodeId, timeout: Duration) -> Self {
		let od = od.into_shared();
		let server = SdoServer::new(od.clone(), local_node_id, timeout);
		Self {
			local_node_id,
			bus: CanOpenSocket::new(socket),
			od,
			server,
			clients: HashMap::new(),
			default_timeout: timeout,
		}
	}

	/// Create a node whose server channel is read from a local SDO server
	/// parameter record (object `0x1200 + n`, CiA 301 section 7.2.3.3).
	pub async fn with_config_entry(
		socket: CanSocket,
		od: ObjectDictionary,
		local_node_id: NodeId,
		timeout: Duration,
		config_index: u16,
	) -> Result<Self, SdoError> {
		let od = od.into_shared();
		let server = SdoServer::with_config_entry(od.clone(), local_node_id, timeout, config_index).await?;
		Ok(Self {
			local_node_id,
			bus: CanOpenSocket::new(socket),
			od,
			server,
			clients: HashMap::new(),
			default_timeout: timeout,
		})
	}

	/// The node ID this node was created with.
	pub fn node_id(&self) -> NodeId {
		self.local_node_id
	}

	/// The shared object dictionary backing this node's SDO server and clients.
	pub fn object_dictionary(&self) -> &Arc<AsyncMutex<ObjectDictionary>> {
		&self.od
	}

	/// The underlying socket, for raw frame access or ambient services
	/// ([`CanOpenSocket::send_sync`], [`CanOpenSocket::send_nmt_command`]).
	pub fn bus(&mut self) -> &mut CanOpenSocket {
		&mut self.bus
	}

	/// Update the NMT state this node's SDO server reports for access checks
	/// that depend on it.
	pub async fn set_nmt_state(&self, state: NmtState) {
		self.server.set_nmt_state(state).await;
	}

	/// Send an NMT command to `node_id` and wait for its heartbeat to confirm
	/// the new state.
	pub async fn send_nmt_command(&mut self, node_id: NodeId, command: NmtCommand, timeout: Duration) -> Result<(), NmtError> {
		self.bus.send_nmt_command(node_id, command, timeout).await
	}

	/// Run this node's SDO server until `cancel` resolves.
	///
	/// In-flight transfers are dropped silently on cancellation, without
	/// emitting an abort frame. Call this in a loop (or spawn it) alongside
	/// whatever drives SYNC production and heartbeat for this node; none of
	/// that is done implicitly.
	pub async fn process<C: Future<Output = ()>>(&mut self, cancel: C) -> Result<(), SdoError> {
		self.server.process(&mut self.bus, cancel).await
	}

	/// Get the SDO client for `remote_node_id`, creating one on first use.
	///
	/// A freshly created client has no preconfigured server link and falls
	/// back to the standard `0x600 + remote_node_id` / `0x580 + remote_node_id`
	/// channel; call [`SdoClient::setup_server`] on the result to override it.
	pub fn client(&mut self, remote_node_id: NodeId) -> &mut SdoClient {
		self.clients.entry(remote_node_id).or_insert_with(|| {
			SdoClient::new(self.od.clone(), self.local_node_id, self.default_timeout)
		})
	}

	/// Get the SDO client for `remote_node_id`, configured from that node's
	/// local SDO client parameter record (object `0x1280 + n`).
	pub async fn client_with_config_entry(&mut self, remote_node_id: NodeId, config_index: u16) -> Result<&mut SdoClient, SdoError> {
		if !self.clients.contains_key(&remote_node_id) {
			let client = SdoClient::with_config_entry(self.od.clone(), self.local_node_id, self.default_timeout, config_index).await?;
			self.clients.insert(remote_node_id, client);
		}
		Ok(self.clients.get_mut(&remote_node_id).expect("just inserted"))
	}
}
