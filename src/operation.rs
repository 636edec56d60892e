//! Logical controller requests and their cache fingerprints.
//!
//! An [`Operation`] names one HTTP exchange (method, path, query parameters, opaque JSON
//! body) together with the metadata the gateway needs around it: whether it mutates
//! controller state, which resource class it touches (cache TTL + invalidation), and
//! which endpoint tier's rate budget it draws from. Operations are immutable once built;
//! the [`catalog`] module offers typed constructors for the calls agents use most.

pub mod catalog;
pub mod id;

pub use id::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, error::ValidationError};

/// HTTP methods understood by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// Read.
	Get,
	/// Create or command.
	Post,
	/// Replace.
	Put,
	/// Partial update.
	Patch,
	/// Remove.
	Delete,
}
impl Method {
	/// Returns the canonical upper-case method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}

	/// Whether requests with this method mutate state by default.
	pub const fn mutates_by_default(self) -> bool {
		!matches!(self, Self::Get)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Resource families used for cache TTLs and invalidation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
	/// Sites (slow-changing).
	Sites,
	/// Adopted devices.
	Devices,
	/// Connected and known clients.
	Clients,
	/// Network configurations.
	Networks,
	/// Wireless networks.
	Wlans,
	/// Legacy firewall rules.
	FirewallRules,
	/// Zone-based firewall zones and policy matrix.
	FirewallZones,
	/// Access control lists.
	Acls,
	/// Port forwarding rules.
	PortForwards,
	/// Hotspot vouchers.
	Vouchers,
	/// WAN interfaces.
	Wans,
	/// Deep packet inspection statistics.
	Dpi,
	/// Network topology.
	Topology,
	/// Alerts.
	Alerts,
	/// Events.
	Events,
	/// Static reference data (countries, application info).
	Reference,
	/// Anything not covered above.
	Other,
}
impl ResourceClass {
	/// Returns a stable label suitable for logs and audit records.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Sites => "sites",
			Self::Devices => "devices",
			Self::Clients => "clients",
			Self::Networks => "networks",
			Self::Wlans => "wlans",
			Self::FirewallRules => "firewall_rules",
			Self::FirewallZones => "firewall_zones",
			Self::Acls => "acls",
			Self::PortForwards => "port_forwards",
			Self::Vouchers => "vouchers",
			Self::Wans => "wans",
			Self::Dpi => "dpi",
			Self::Topology => "topology",
			Self::Alerts => "alerts",
			Self::Events => "events",
			Self::Reference => "reference",
			Self::Other => "other",
		}
	}
}
impl Display for ResourceClass {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Controller API tiers with distinct published rate budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointTier {
	/// Early-access endpoints (`/ea/...`), small budget.
	EarlyAccess,
	/// Versioned integration endpoints, large budget.
	General,
}
impl EndpointTier {
	const EARLY_ACCESS_PREFIX: &'static str = "/ea/";

	/// Infers the tier from a request path.
	pub fn for_path(path: &str) -> Self {
		if path.starts_with(Self::EARLY_ACCESS_PREFIX) || path == "/ea" {
			Self::EarlyAccess
		} else {
			Self::General
		}
	}

	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::EarlyAccess => "early_access",
			Self::General => "general",
		}
	}
}
impl Display for EndpointTier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Deterministic cache key derived from method, path, and parameters.
///
/// The digest is a base64 (no padding) SHA-256 over the method, the path, and the
/// parameters in sorted order. Each component is length-prefixed, so values containing
/// `&` or `=` cannot collide with a different parameter set. The path is kept alongside
/// so prefix invalidation can match on it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
	path: String,
	digest: String,
}
impl Fingerprint {
	fn compute(method: Method, path: &str, params: &BTreeMap<String, String>) -> Self {
		fn field(hasher: &mut Sha256, bytes: &[u8]) {
			hasher.update((bytes.len() as u64).to_be_bytes());
			hasher.update(bytes);
		}

		let mut hasher = Sha256::new();

		field(&mut hasher, method.as_str().as_bytes());
		field(&mut hasher, path.as_bytes());
		hasher.update((params.len() as u64).to_be_bytes());

		for (key, value) in params {
			field(&mut hasher, key.as_bytes());
			field(&mut hasher, value.as_bytes());
		}

		Self { path: path.to_owned(), digest: STANDARD_NO_PAD.encode(hasher.finalize()) }
	}

	/// Request path the fingerprint was derived from.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Encoded digest.
	pub fn digest(&self) -> &str {
		&self.digest
	}
}
impl Debug for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Fingerprint").field(&self.path).field(&self.digest).finish()
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}#{}", self.path, self.digest)
	}
}

/// Secret-free description of an operation, used by audit records and logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
	/// Operation kind label (`create_firewall_rule`, `restart_device`, ...).
	pub kind: String,
	/// HTTP method.
	pub method: Method,
	/// Request path.
	pub path: String,
	/// Resource class touched by the operation.
	pub resource: ResourceClass,
	/// Target identifier (MAC, rule id, ...), when the operation addresses one.
	pub target: Option<String>,
}

/// An immutable logical request.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
	kind: String,
	method: Method,
	path: String,
	params: BTreeMap<String, String>,
	body: Option<Value>,
	mutating: bool,
	resource: ResourceClass,
	tier: EndpointTier,
	target: Option<String>,
}
impl Operation {
	/// Starts a builder for an arbitrary method.
	pub fn builder(
		kind: impl Into<String>,
		method: Method,
		path: impl Into<String>,
	) -> OperationBuilder {
		OperationBuilder::new(kind, method, path)
	}

	/// Starts a builder for a read.
	pub fn read(kind: impl Into<String>, path: impl Into<String>) -> OperationBuilder {
		OperationBuilder::new(kind, Method::Get, path)
	}

	/// Operation kind label.
	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// HTTP method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Request path, relative to the controller base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Query parameters in sorted order.
	pub fn params(&self) -> &BTreeMap<String, String> {
		&self.params
	}

	/// Opaque JSON body.
	pub fn body(&self) -> Option<&Value> {
		self.body.as_ref()
	}

	/// Whether the operation mutates controller state.
	pub fn is_mutating(&self) -> bool {
		self.mutating
	}

	/// Resource class touched by the operation.
	pub fn resource(&self) -> ResourceClass {
		self.resource
	}

	/// Endpoint tier whose rate budget applies.
	pub fn tier(&self) -> EndpointTier {
		self.tier
	}

	/// Target identifier, when the operation addresses one resource.
	pub fn target(&self) -> Option<&str> {
		self.target.as_deref()
	}

	/// Cache key for reads; mutations never yield one.
	pub fn fingerprint(&self) -> Option<Fingerprint> {
		if self.mutating {
			return None;
		}

		Some(Fingerprint::compute(self.method, &self.path, &self.params))
	}

	/// Secret-free summary for audit records.
	pub fn summary(&self) -> OperationSummary {
		OperationSummary {
			kind: self.kind.clone(),
			method: self.method,
			path: self.path.clone(),
			resource: self.resource,
			target: self.target.clone(),
		}
	}
}

/// Builder for [`Operation`] values.
#[derive(Debug)]
pub struct OperationBuilder {
	kind: String,
	method: Method,
	path: String,
	params: BTreeMap<String, String>,
	body: Option<Value>,
	mutating: Option<bool>,
	resource: ResourceClass,
	tier: Option<EndpointTier>,
	target: Option<String>,
}
impl OperationBuilder {
	fn new(kind: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			method,
			path: path.into(),
			params: BTreeMap::new(),
			body: None,
			mutating: None,
			resource: ResourceClass::Other,
			tier: None,
			target: None,
		}
	}

	/// Adds a query parameter; later values replace earlier ones for the same key.
	pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.params.insert(key.into(), value.to_string());

		self
	}

	/// Adds a query parameter when a value is present.
	pub fn param_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
		match value {
			Some(value) => self.param(key, value),
			None => self,
		}
	}

	/// Sets the JSON body.
	pub fn body(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Overrides the mutating flag inferred from the method.
	pub fn mutating(mut self, mutating: bool) -> Self {
		self.mutating = Some(mutating);

		self
	}

	/// Sets the resource class.
	pub fn resource(mut self, resource: ResourceClass) -> Self {
		self.resource = resource;

		self
	}

	/// Overrides the tier inferred from the path.
	pub fn tier(mut self, tier: EndpointTier) -> Self {
		self.tier = Some(tier);

		self
	}

	/// Records the addressed resource identifier.
	pub fn target(mut self, target: impl Into<String>) -> Self {
		self.target = Some(target.into());

		self
	}

	/// Consumes the builder and validates the resulting operation.
	pub fn build(self) -> Result<Operation, ValidationError> {
		validate_kind(&self.kind)?;
		validate_path(&self.path)?;

		let mutating = self.mutating.unwrap_or_else(|| self.method.mutates_by_default());
		let tier = self.tier.unwrap_or_else(|| EndpointTier::for_path(&self.path));

		Ok(Operation {
			kind: self.kind,
			method: self.method,
			path: self.path,
			params: self.params,
			body: self.body,
			mutating,
			resource: self.resource,
			tier,
			target: self.target,
		})
	}
}

fn validate_kind(kind: &str) -> Result<(), ValidationError> {
	if kind.is_empty() || kind.chars().any(char::is_whitespace) {
		return Err(ValidationError::InvalidOperation {
			reason: "operation kind must be a non-empty label without whitespace".into(),
		});
	}

	Ok(())
}

fn validate_path(path: &str) -> Result<(), ValidationError> {
	let reason = if !path.starts_with('/') {
		"path must start with `/`"
	} else if path.contains(['?', '#']) {
		"path must not embed a query string or fragment"
	} else if path.chars().any(char::is_whitespace) {
		"path must not contain whitespace"
	} else if path.split('/').any(|segment| segment == "..") {
		"path must not contain `..` segments"
	} else {
		return Ok(());
	};

	Err(ValidationError::InvalidOperation { reason: reason.into() })
}
