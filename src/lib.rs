//! Request-execution core for agents driving a UniFi Network controller: authenticated,
//! sliding-window rate-limited, retried and cached HTTP exchanges, with a confirmation,
//! dry-run and audit discipline in front of every mutation.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod limiter;
pub mod obs;
pub mod operation;
pub mod outcome;
pub mod retry;
pub mod safety;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

pub use crate::{
	audit::{AuditLog, AuditRecord, FileAuditLog, MemoryAuditLog},
	auth::{AuthProvider, CloudAuth, Credentials, LocalAuth, TransportMode},
	cache::ResponseCache,
	config::GatewayConfig,
	error::{Error, ErrorKind, Result},
	gateway::Gateway,
	limiter::RateLimiter,
	operation::Operation,
	outcome::Outcome,
	retry::RetryPolicy,
	safety::{MutationRequest, SafetyFlags, SafetyGate},
};
