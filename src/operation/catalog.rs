//! Typed constructors for the controller calls agents issue most often.
//!
//! Each helper only assembles an [`Operation`]: path, resource class, target, and an
//! opaque body supplied by the resource-schema layer. Reads go through
//! [`Gateway::execute`](crate::gateway::Gateway::execute); mutations through the
//! [`SafetyGate`](crate::safety::SafetyGate).

// crates.io
use serde_json::json;
// self
use crate::{
	_prelude::*,
	error::ValidationError,
	operation::{Method, Operation, ResourceClass, ResourceId, SiteId},
};

type BuildResult = Result<Operation, ValidationError>;

/// Lists every site visible to the API key.
pub fn list_sites() -> BuildResult {
	Operation::read("list_sites", "/ea/sites").resource(ResourceClass::Sites).build()
}

/// Lists devices adopted by a site.
pub fn list_devices(site: &SiteId) -> BuildResult {
	Operation::read("list_devices", format!("/ea/sites/{site}/devices"))
		.resource(ResourceClass::Devices)
		.build()
}

/// Lists currently connected clients.
pub fn list_active_clients(site: &SiteId) -> BuildResult {
	Operation::read("list_active_clients", format!("/ea/sites/{site}/sta"))
		.resource(ResourceClass::Clients)
		.build()
}

/// Lists all known clients, including offline ones.
pub fn list_all_clients(site: &SiteId) -> BuildResult {
	Operation::read("list_all_clients", format!("/ea/sites/{site}/stat/alluser"))
		.resource(ResourceClass::Clients)
		.build()
}

/// Lists network configurations.
pub fn list_networks(site: &SiteId) -> BuildResult {
	Operation::read("list_networks", format!("/ea/sites/{site}/rest/networkconf"))
		.resource(ResourceClass::Networks)
		.build()
}

/// Lists wireless networks.
pub fn list_wlans(site: &SiteId) -> BuildResult {
	Operation::read("list_wlans", format!("/ea/sites/{site}/rest/wlanconf"))
		.resource(ResourceClass::Wlans)
		.build()
}

/// Lists legacy firewall rules.
pub fn list_firewall_rules(site: &SiteId) -> BuildResult {
	Operation::read("list_firewall_rules", format!("/ea/sites/{site}/rest/firewallrule"))
		.resource(ResourceClass::FirewallRules)
		.build()
}

/// Lists port forwarding rules.
pub fn list_port_forwards(site: &SiteId) -> BuildResult {
	Operation::read("list_port_forwards", format!("/ea/sites/{site}/rest/portforward"))
		.resource(ResourceClass::PortForwards)
		.build()
}

/// Lists zone-based firewall zones.
pub fn list_firewall_zones(site: &SiteId) -> BuildResult {
	Operation::read("list_firewall_zones", format!("/integration/v1/sites/{site}/firewall/zones"))
		.resource(ResourceClass::FirewallZones)
		.build()
}

/// Lists WAN interfaces.
pub fn list_wans(site: &SiteId) -> BuildResult {
	Operation::read("list_wans", format!("/integration/v1/sites/{site}/wans"))
		.resource(ResourceClass::Wans)
		.build()
}

/// Fetches site-wide DPI statistics.
pub fn dpi_stats(site: &SiteId) -> BuildResult {
	Operation::read("dpi_stats", format!("/ea/sites/{site}/stat/dpi"))
		.resource(ResourceClass::Dpi)
		.build()
}

/// Creates a legacy firewall rule from a schema-layer body.
pub fn create_firewall_rule(site: &SiteId, rule: Value) -> BuildResult {
	Operation::builder(
		"create_firewall_rule",
		Method::Post,
		format!("/ea/sites/{site}/rest/firewallrule"),
	)
	.body(rule)
	.resource(ResourceClass::FirewallRules)
	.build()
}

/// Replaces a legacy firewall rule.
pub fn update_firewall_rule(site: &SiteId, rule_id: &ResourceId, rule: Value) -> BuildResult {
	Operation::builder(
		"update_firewall_rule",
		Method::Put,
		format!("/ea/sites/{site}/rest/firewallrule/{rule_id}"),
	)
	.body(rule)
	.resource(ResourceClass::FirewallRules)
	.target(rule_id.as_ref())
	.build()
}

/// Deletes a legacy firewall rule.
pub fn delete_firewall_rule(site: &SiteId, rule_id: &ResourceId) -> BuildResult {
	Operation::builder(
		"delete_firewall_rule",
		Method::Delete,
		format!("/ea/sites/{site}/rest/firewallrule/{rule_id}"),
	)
	.resource(ResourceClass::FirewallRules)
	.target(rule_id.as_ref())
	.build()
}

/// Creates a wireless network.
pub fn create_wlan(site: &SiteId, wlan: Value) -> BuildResult {
	Operation::builder("create_wlan", Method::Post, format!("/ea/sites/{site}/rest/wlanconf"))
		.body(wlan)
		.resource(ResourceClass::Wlans)
		.build()
}

/// Deletes a wireless network.
pub fn delete_wlan(site: &SiteId, wlan_id: &ResourceId) -> BuildResult {
	Operation::builder(
		"delete_wlan",
		Method::Delete,
		format!("/ea/sites/{site}/rest/wlanconf/{wlan_id}"),
	)
	.resource(ResourceClass::Wlans)
	.target(wlan_id.as_ref())
	.build()
}

/// Creates a port forwarding rule.
pub fn create_port_forward(site: &SiteId, rule: Value) -> BuildResult {
	Operation::builder(
		"create_port_forward",
		Method::Post,
		format!("/ea/sites/{site}/rest/portforward"),
	)
	.body(rule)
	.resource(ResourceClass::PortForwards)
	.build()
}

/// Restarts a device.
pub fn restart_device(site: &SiteId, mac: &ResourceId) -> BuildResult {
	device_command("restart_device", site, mac, "restart")
}

/// Toggles the locate LED on a device.
pub fn locate_device(site: &SiteId, mac: &ResourceId, enabled: bool) -> BuildResult {
	let cmd = if enabled { "set-locate" } else { "unset-locate" };

	device_command("locate_device", site, mac, cmd)
}

/// Blocks a client from the network.
pub fn block_client(site: &SiteId, mac: &ResourceId) -> BuildResult {
	client_command("block_client", site, mac, "block-sta")
}

/// Lifts a client block.
pub fn unblock_client(site: &SiteId, mac: &ResourceId) -> BuildResult {
	client_command("unblock_client", site, mac, "unblock-sta")
}

/// Forces a client to reconnect.
pub fn reconnect_client(site: &SiteId, mac: &ResourceId) -> BuildResult {
	client_command("reconnect_client", site, mac, "kick-sta")
}

fn device_command(kind: &str, site: &SiteId, mac: &ResourceId, cmd: &str) -> BuildResult {
	Operation::builder(kind, Method::Post, format!("/ea/sites/{site}/cmd/devmgr"))
		.body(json!({ "mac": mac.as_ref(), "cmd": cmd }))
		.resource(ResourceClass::Devices)
		.target(mac.as_ref())
		.build()
}

fn client_command(kind: &str, site: &SiteId, mac: &ResourceId, cmd: &str) -> BuildResult {
	Operation::builder(kind, Method::Post, format!("/ea/sites/{site}/cmd/stamgr"))
		.body(json!({ "mac": mac.as_ref(), "cmd": cmd }))
		.resource(ResourceClass::Clients)
		.target(mac.as_ref())
		.build()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::operation::EndpointTier;

	fn site() -> SiteId {
		SiteId::new("default").expect("Site fixture should be valid.")
	}

	#[test]
	fn reads_are_cacheable_and_tiered() {
		let op = list_devices(&site()).expect("list_devices should build.");

		assert!(!op.is_mutating());
		assert_eq!(op.path(), "/ea/sites/default/devices");
		assert_eq!(op.tier(), EndpointTier::EarlyAccess);
		assert!(op.fingerprint().is_some());

		let zones = list_firewall_zones(&site()).expect("list_firewall_zones should build.");

		assert_eq!(zones.tier(), EndpointTier::General);
	}

	#[test]
	fn device_commands_target_the_mac() {
		let mac = ResourceId::new("aa:bb:cc:dd:ee:ff").expect("MAC fixture should be valid.");
		let op = restart_device(&site(), &mac).expect("restart_device should build.");

		assert!(op.is_mutating());
		assert_eq!(op.resource(), ResourceClass::Devices);
		assert_eq!(op.target(), Some("aa:bb:cc:dd:ee:ff"));
		assert_eq!(op.body(), Some(&json!({ "mac": "aa:bb:cc:dd:ee:ff", "cmd": "restart" })));

		let op = locate_device(&site(), &mac, false).expect("locate_device should build.");

		assert_eq!(op.body().and_then(|body| body.get("cmd")), Some(&json!("unset-locate")));
	}
}
