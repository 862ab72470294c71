use std::time::Duration;

use can_socket::tokio::CanSocket;
use canopen_tokio::dictionary::{Attribute, DataType, ObjectDictionaryBuilder, Value};
use canopen_tokio::nmt::NmtState;
use canopen_tokio::CanOpenNode;

#[derive(clap::Parser)]
struct Options {
	/// The CAN interface to use.
	interface: String,

	/// The node ID to serve.
	node_id: u8,
}

#[tokio::main]
async fn main() {
	env_logger::builder()
		.filter_module(module_path!(), log::LevelFilter::Info)
		.parse_default_env()
		.init();
	if let Err(()) = do_main(clap::Parser::parse()).await {
		std::process::exit(1);
	}
}

async fn do_main(options: Options) -> Result<(), ()> {
	let socket = CanSocket::bind(&options.interface)
		.map_err(|e| log::error!("Failed to create CAN socket for interface {}: {e}", options.interface))?;

	let od = ObjectDictionaryBuilder::new(options.node_id)
		.variable(0x1000, "Device type", DataType::Unsigned32, Attribute::READ_ONLY, Value::from_bytes(&0u32.to_le_bytes()))
		.variable(0x1001, "Error register", DataType::Unsigned8, Attribute::READ_ONLY, Value::from_bytes(&[0]))
		.variable(0x2000, "Counter", DataType::Unsigned32, Attribute::READ_WRITE, Value::from_bytes(&0u32.to_le_bytes()))
		.build();

	let mut node = CanOpenNode::new(socket, od, options.node_id, Duration::from_secs(1));
	node.set_nmt_state(NmtState::Operational).await;

	log::info!("Serving object dictionary for node {} on {}", options.node_id, options.interface);
	let cancel = async {
		let _ = tokio::signal::ctrl_c().await;
	};
	node.process(cancel)
		.await
		.map_err(|e| log::error!("SDO server stopped: {e}"))?;
	Ok(())
}
