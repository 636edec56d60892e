// self
use crate::{_prelude::*, obs::CallKind, operation::Operation, outcome::Outcome};

/// Span covering one gateway or safety-gate call.
///
/// `outcome` and `attempts` are declared empty and filled in when the call finishes, so a
/// single span line carries both the request and its result.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Opens a span for `op`, labelled with the call kind and endpoint tier.
	pub fn new(kind: CallKind, op: &Operation) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"unifi_gateway.call",
				kind = kind.as_str(),
				operation = op.kind(),
				tier = op.tier().as_str(),
				outcome = tracing::field::Empty,
				attempts = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, op);

			Self {}
		}
	}

	/// Drives `call` inside the span and records its outcome on the span.
	pub async fn run<Fut>(self, call: Fut) -> Outcome
	where
		Fut: Future<Output = Outcome>,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			let outcome = call.instrument(self.span.clone()).await;
			let label = outcome.error_kind().map_or("ok", |kind| kind.as_str());

			self.span.record("outcome", label);
			self.span.record("attempts", outcome.attempts());

			outcome
		}
		#[cfg(not(feature = "tracing"))]
		{
			call.await
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::outcome::PayloadSource;

	#[tokio::test]
	async fn run_returns_the_call_outcome() {
		let op = Operation::read("list_sites", "/ea/sites").build().expect("Read should build.");
		let outcome = CallSpan::new(CallKind::Read, &op)
			.run(async { Outcome::ok(Value::Null, PayloadSource::Cache, 0, Duration::ZERO) })
			.await;

		assert!(outcome.is_ok());
		assert_eq!(outcome.source(), Some(PayloadSource::Cache));
	}
}
