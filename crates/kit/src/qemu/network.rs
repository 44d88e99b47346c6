//! Network backend and device arguments.

use super::{Error, Fragments, NETDEV_ID};
use crate::config::Config;
use crate::facts::RuntimeFacts;

/// The `-device` value attaching `net_device` to our backend.
pub fn net_device_fragment(net_device: &str) -> String {
    format!("{net_device},netdev={NETDEV_ID}")
}

/// Compute `-netdev` and the network `-device`.
///
/// Without a bridge the backend is user-mode networking, forwarding a host
/// port to the guest communicator when one is configured. With a bridge the
/// guest is attached to it directly and no forwarding is set up.
pub fn build(config: &Config, facts: &RuntimeFacts) -> Result<Fragments, Error> {
    let netdev = match config.net_bridge.as_deref() {
        Some(bridge) => format!("bridge,id={NETDEV_ID},br={bridge}"),
        None if config.communicator.is_enabled() => {
            let host_port = facts
                .comm_host_port
                .ok_or(Error::MissingRuntimeFact("comm_host_port"))?;
            format!(
                "user,id={NETDEV_ID},hostfwd=tcp::{host_port}-:{}",
                config.communicator.port()
            )
        }
        None => format!("user,id={NETDEV_ID}"),
    };

    let mut out = Fragments::default();
    out.flags.set("-netdev", netdev);
    out.flags
        .append("-device", net_device_fragment(&config.net_device));
    Ok(out)
}
