//! Delivery gate: waits for readiness, then hands out the live delivery stream.

// self
use crate::{
	_prelude::*,
	consumer::{BrokerChannel, BrokerConnection, DeliveryStream, supervisor::Shared},
	error::ConnectionError,
	obs::{FlowKind, FlowSpan},
};

const PREFETCH: u16 = 1;

/// One message received from the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
	/// Exchange the message was published to.
	pub exchange: String,
	/// Routing key it was published with.
	pub routing_key: String,
	/// `correlation-id` property.
	pub correlation_id: Option<String>,
	/// `reply-to` property.
	pub reply_to: Option<String>,
	/// Header table, flattened to strings.
	pub headers: BTreeMap<String, String>,
	/// Message body.
	pub body: Vec<u8>,
}

/// Hands out delivery streams once the supervisor reports readiness.
pub struct DeliveryGate<C>
where
	C: BrokerConnection,
{
	shared: Arc<Shared<C>>,
	poll: Duration,
	shutdown: CancellationToken,
}
impl<C> DeliveryGate<C>
where
	C: BrokerConnection,
{
	pub(crate) fn new(shared: Arc<Shared<C>>, poll: Duration, shutdown: CancellationToken) -> Self {
		Self { shared, poll, shutdown }
	}

	/// Returns true while a channel with every binding is established.
	pub fn is_ready(&self) -> bool {
		self.shared.is_ready()
	}

	/// Waits until ready, then starts an auto-acknowledged consumer with prefetch 1.
	///
	/// Fails with [`Error::NotConnected`] when shutdown is requested or the supervisor stops
	/// while waiting. The stream ends when the channel closes; call again to resume after the
	/// supervisor recovers.
	pub async fn deliveries(&self) -> Result<DeliveryStream> {
		FlowSpan::new(FlowKind::Consume, "deliveries")
			.observe(async {
				let (channel, queue) = self.wait_ready().await?;

				channel.set_prefetch(PREFETCH).await.map_err(ConnectionError::classify)?;

				let stream = channel.consume(&queue).await.map_err(ConnectionError::classify)?;

				tracing::info!(%queue, "Consuming deliveries.");

				Ok(stream)
			})
			.await
	}

	async fn wait_ready(&self) -> Result<(Arc<C::Channel>, String)> {
		loop {
			if self.shutdown.is_cancelled() {
				return Err(Error::NotConnected);
			}

			match self.shared.ready_channel() {
				Readiness::Ready { channel, queue } => return Ok((channel, queue)),
				Readiness::Stopped => return Err(Error::NotConnected),
				Readiness::Pending => {},
			}

			tokio::select! {
				_ = self.shutdown.cancelled() => return Err(Error::NotConnected),
				_ = tokio::time::sleep(self.poll) => {},
			}
		}
	}
}
impl<C> Clone for DeliveryGate<C>
where
	C: BrokerConnection,
{
	fn clone(&self) -> Self {
		Self { shared: self.shared.clone(), poll: self.poll, shutdown: self.shutdown.clone() }
	}
}
impl<C> Debug for DeliveryGate<C>
where
	C: BrokerConnection,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeliveryGate")
			.field("ready", &self.is_ready())
			.field("poll", &self.poll)
			.finish_non_exhaustive()
	}
}

/// Snapshot of the shared readiness flag.
pub(crate) enum Readiness<Ch> {
	Ready { channel: Arc<Ch>, queue: String },
	Pending,
	Stopped,
}
