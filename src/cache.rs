//! Fingerprint-keyed response cache for reads.
//!
//! Entries carry the resource class and path they were stored under, so a mutation can
//! invalidate by class or by path prefix. Expiry is lazy: stale entries are dropped the
//! next time they are looked up (or by [`ResponseCache::purge_expired`]).

// self
use crate::{
	_prelude::*,
	operation::{Fingerprint, Operation, ResourceClass},
};

/// Time-to-live per resource class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheTtls {
	default: Duration,
	overrides: HashMap<ResourceClass, Duration>,
}
impl CacheTtls {
	/// Creates a table where every class uses `default`.
	pub fn uniform(default: Duration) -> Self {
		Self { default, overrides: HashMap::new() }
	}

	/// Overrides the TTL for one class.
	pub fn with(mut self, class: ResourceClass, ttl: Duration) -> Self {
		self.overrides.insert(class, ttl);

		self
	}

	/// TTL applied to `class`.
	pub fn ttl_for(&self, class: ResourceClass) -> Duration {
		self.overrides.get(&class).copied().unwrap_or(self.default)
	}
}
impl Default for CacheTtls {
	fn default() -> Self {
		let minutes = |m: u64| Duration::from_secs(m * 60);

		Self::uniform(Duration::from_secs(60))
			.with(ResourceClass::Sites, minutes(5))
			.with(ResourceClass::Devices, minutes(1))
			.with(ResourceClass::Clients, Duration::from_secs(30))
			.with(ResourceClass::Networks, minutes(5))
			.with(ResourceClass::Wlans, minutes(5))
			.with(ResourceClass::FirewallRules, minutes(5))
			.with(ResourceClass::FirewallZones, minutes(5))
			.with(ResourceClass::Acls, minutes(5))
			.with(ResourceClass::PortForwards, minutes(5))
			.with(ResourceClass::Dpi, minutes(2))
			.with(ResourceClass::Topology, minutes(1))
			.with(ResourceClass::Alerts, Duration::from_secs(30))
			.with(ResourceClass::Events, Duration::from_secs(30))
			.with(ResourceClass::Reference, minutes(60))
	}
}

/// A cached payload.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	/// Cached JSON payload.
	pub payload: Value,
	/// Resource class of the read that produced it.
	pub resource: ResourceClass,
	/// When the payload was stored.
	pub stored_at: Instant,
	/// Lifetime of the entry.
	pub ttl: Duration,
}
impl CacheEntry {
	/// Whether the entry is still fresh at `now`.
	pub fn is_fresh_at(&self, now: Instant) -> bool {
		now.saturating_duration_since(self.stored_at) < self.ttl
	}

	/// Age of the entry at `now`.
	pub fn age_at(&self, now: Instant) -> Duration {
		now.saturating_duration_since(self.stored_at)
	}
}

/// In-memory TTL cache for read payloads.
#[derive(Debug)]
pub struct ResponseCache {
	enabled: bool,
	ttls: CacheTtls,
	entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}
impl ResponseCache {
	/// Creates an enabled cache with the given TTL table.
	pub fn new(ttls: CacheTtls) -> Self {
		Self { enabled: true, ttls, entries: Mutex::new(HashMap::new()) }
	}

	/// Creates a cache that never stores anything.
	pub fn disabled() -> Self {
		Self { enabled: false, ttls: CacheTtls::default(), entries: Mutex::new(HashMap::new()) }
	}

	/// Whether the cache stores payloads.
	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// TTL table in use.
	pub fn ttls(&self) -> &CacheTtls {
		&self.ttls
	}

	/// Returns a fresh entry for the read, evicting it when expired.
	pub fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
		if !self.enabled {
			return None;
		}

		let now = Instant::now();
		let mut entries = self.entries.lock();

		match entries.get(key) {
			Some(entry) if entry.is_fresh_at(now) => Some(entry.clone()),
			Some(_) => {
				entries.remove(key);

				None
			},
			None => None,
		}
	}

	/// Stores a read's payload under its fingerprint. Mutations are ignored.
	pub fn put(&self, op: &Operation, payload: Value) {
		if !self.enabled {
			return;
		}

		let Some(key) = op.fingerprint() else { return };
		let entry = CacheEntry {
			payload,
			resource: op.resource(),
			stored_at: Instant::now(),
			ttl: self.ttls.ttl_for(op.resource()),
		};

		self.entries.lock().insert(key, entry);
	}

	/// Drops every entry whose path starts with `prefix`. Returns the number removed.
	pub fn invalidate(&self, prefix: &str) -> usize {
		self.retain(|key, _| !key.path().starts_with(prefix))
	}

	/// Drops every entry whose path overlaps `path` segment-wise (either is an ancestor of
	/// the other). Returns the number removed.
	pub fn invalidate_overlapping(&self, path: &str) -> usize {
		self.retain(|key, _| !paths_overlap(key.path(), path))
	}

	/// Drops every entry of a resource class. Returns the number removed.
	pub fn invalidate_resource(&self, resource: ResourceClass) -> usize {
		self.retain(|_, entry| entry.resource != resource)
	}

	/// Drops every entry of `resource` and every entry whose path overlaps `path`.
	/// Returns the number removed.
	pub fn invalidate_mutated(&self, resource: ResourceClass, path: &str) -> usize {
		self.retain(|key, entry| entry.resource != resource && !paths_overlap(key.path(), path))
	}

	/// Drops expired entries. Returns the number removed.
	pub fn purge_expired(&self) -> usize {
		let now = Instant::now();

		self.retain(|_, entry| entry.is_fresh_at(now))
	}

	/// Drops everything.
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Number of stored entries, including ones that have expired but not been evicted.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Whether no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn retain(&self, mut keep: impl FnMut(&Fingerprint, &CacheEntry) -> bool) -> usize {
		let mut entries = self.entries.lock();
		let before = entries.len();

		entries.retain(|key, entry| keep(key, entry));

		before - entries.len()
	}
}
impl Default for ResponseCache {
	fn default() -> Self {
		Self::new(CacheTtls::default())
	}
}

fn paths_overlap(a: &str, b: &str) -> bool {
	let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
	let short = short.trim_end_matches('/');

	long.starts_with(short) && matches!(long.as_bytes().get(short.len()), None | Some(b'/'))
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn read(kind: &str, path: &str, resource: ResourceClass) -> Operation {
		Operation::read(kind, path)
			.resource(resource)
			.build()
			.expect("Read operation fixture should build.")
	}

	#[tokio::test(start_paused = true)]
	async fn entries_expire_per_resource_class() {
		let cache = ResponseCache::default();
		let clients = read("list_active_clients", "/ea/sites/default/sta", ResourceClass::Clients);
		let sites = read("list_sites", "/ea/sites", ResourceClass::Sites);
		let clients_key = clients.fingerprint().expect("Reads should fingerprint.");
		let sites_key = sites.fingerprint().expect("Reads should fingerprint.");

		cache.put(&clients, json!([1]));
		cache.put(&sites, json!([2]));
		tokio::time::advance(Duration::from_secs(31)).await;

		assert!(cache.get(&clients_key).is_none());
		assert_eq!(cache.get(&sites_key).map(|entry| entry.payload), Some(json!([2])));
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn invalidation_by_class_and_prefix() {
		let cache = ResponseCache::default();

		cache.put(
			&read("list_firewall_rules", "/ea/sites/a/rest/firewallrule", ResourceClass::FirewallRules),
			json!([]),
		);
		cache.put(
			&read("list_firewall_rules", "/ea/sites/b/rest/firewallrule", ResourceClass::FirewallRules),
			json!([]),
		);
		cache.put(&read("list_devices", "/ea/sites/a/devices", ResourceClass::Devices), json!([]));

		assert_eq!(cache.invalidate("/ea/sites/a/devices"), 1);
		assert_eq!(cache.invalidate_overlapping("/ea/sites/a/rest/firewallrule/42"), 1);
		assert_eq!(cache.invalidate_overlapping("/ea/sites/b/rest/firewall"), 0);
		assert_eq!(cache.invalidate_resource(ResourceClass::FirewallRules), 1);
		assert!(cache.is_empty());
	}

	#[test]
	fn mutation_invalidation_covers_class_and_path() {
		let cache = ResponseCache::default();

		cache.put(
			&read("list_firewall_rules", "/ea/sites/a/rest/firewallrule", ResourceClass::FirewallRules),
			json!([]),
		);
		cache.put(&read("list_devices", "/ea/sites/a/devices", ResourceClass::Devices), json!([]));
		cache.put(&read("list_sites", "/ea/sites", ResourceClass::Sites), json!([]));

		assert_eq!(cache.invalidate_mutated(ResourceClass::Other, "/ea/sites/a/rest/firewallrule"), 2);
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.invalidate_mutated(ResourceClass::Devices, "/ea/sites/b/cmd/devmgr"), 1);
		assert!(cache.is_empty());
	}

	#[test]
	fn disabled_cache_stores_nothing() {
		let cache = ResponseCache::disabled();
		let op = read("list_sites", "/ea/sites", ResourceClass::Sites);

		cache.put(&op, json!([]));

		assert!(cache.is_empty());
		assert!(cache.get(&op.fingerprint().expect("Reads should fingerprint.")).is_none());
	}

	#[test]
	fn default_ttls_follow_resource_volatility() {
		let ttls = CacheTtls::default();

		assert_eq!(ttls.ttl_for(ResourceClass::Sites), Duration::from_secs(300));
		assert_eq!(ttls.ttl_for(ResourceClass::Clients), Duration::from_secs(30));
		assert_eq!(ttls.ttl_for(ResourceClass::Other), Duration::from_secs(60));
	}
}
