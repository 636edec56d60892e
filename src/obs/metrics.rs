// self
use crate::{
	obs::{CallKind, CallOutcome},
	operation::EndpointTier,
};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"unifi_gateway_call_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts one scheduled retry for the given tier.
pub fn record_retry(tier: EndpointTier) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("unifi_gateway_retry_total", "tier" => tier.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = tier;
	}
}

/// Counts one request that had to wait for a rate-limit slot.
pub fn record_rate_limit_wait(tier: EndpointTier) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("unifi_gateway_rate_limit_wait_total", "tier" => tier.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = tier;
	}
}
