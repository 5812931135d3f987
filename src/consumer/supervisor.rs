//! Connection supervisor: dial, initialize, watch, and recover.

// crates.io
use tokio::{sync::broadcast, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	auth::Endpoint,
	config::SinkConfig,
	consumer::{
		BackoffPolicy, BrokerChannel, BrokerConnection, ChannelInitializer, CloseWatch,
		ConnectionState, Connector, DeliveryGate, LifecycleEvent, Trigger, delivery::Readiness,
	},
	error::ConnectionError,
	obs::{self, FlowKind, FlowSpan},
};

const EVENT_CAPACITY: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the supervisor and its delivery gates.
///
/// One lock guards the lifecycle state, the readiness flag, and the live handles. It is held only
/// while reading or writing them, never across broker I/O.
pub(crate) struct Shared<C>
where
	C: BrokerConnection,
{
	inner: Mutex<Inner<C>>,
}
impl<C> Shared<C>
where
	C: BrokerConnection,
{
	fn new() -> Self {
		Self {
			inner: Mutex::new(Inner {
				state: ConnectionState::Disconnected,
				ready: false,
				stopped: false,
				connection: None,
				channel: None,
				queue: None,
			}),
		}
	}

	pub(crate) fn state(&self) -> ConnectionState {
		self.inner.lock().state
	}

	pub(crate) fn is_ready(&self) -> bool {
		self.inner.lock().ready
	}

	pub(crate) fn ready_channel(&self) -> Readiness<C::Channel> {
		let inner = self.inner.lock();

		match (&inner.channel, &inner.queue) {
			(Some(channel), Some(queue)) if inner.ready =>
				Readiness::Ready { channel: channel.clone(), queue: queue.clone() },
			_ if inner.stopped => Readiness::Stopped,
			_ => Readiness::Pending,
		}
	}

	fn apply(&self, trigger: Trigger) -> Option<LifecycleEvent> {
		let mut inner = self.inner.lock();
		let from = inner.state;
		let to = from.on(trigger)?;

		inner.state = to;

		Some(LifecycleEvent { from, trigger, to })
	}

	fn install_connection(&self, connection: Arc<C>) {
		self.inner.lock().connection = Some(connection);
	}

	fn clear_ready(&self) {
		let mut inner = self.inner.lock();

		inner.ready = false;
		inner.channel = None;
	}

	// Channel and readiness become visible together, after every binding is in place.
	fn publish_ready(&self, channel: Arc<C::Channel>, queue: String) {
		let mut inner = self.inner.lock();

		inner.channel = Some(channel);
		inner.queue = Some(queue);
		inner.ready = true;
	}

	fn take_handles(&self) -> (Option<Arc<C::Channel>>, Option<Arc<C>>) {
		let mut inner = self.inner.lock();

		inner.ready = false;

		(inner.channel.take(), inner.connection.take())
	}

	fn stop(&self) {
		let mut inner = self.inner.lock();

		inner.ready = false;
		inner.stopped = true;
		inner.channel = None;
		inner.connection = None;
	}
}

struct Inner<C>
where
	C: BrokerConnection,
{
	state: ConnectionState,
	ready: bool,
	stopped: bool,
	connection: Option<Arc<C>>,
	channel: Option<Arc<C::Channel>>,
	queue: Option<String>,
}

enum Exit {
	Shutdown,
	ConnectionLost,
}

/// Owns the connect/reconnect loop for one broker endpoint.
///
/// Access refusals stop the loop for good. Every other dial failure is retried forever with
/// capped exponential backoff; channel setup failures are retried on the same connection with
/// an independent backoff until the connection itself closes.
pub struct ConnectionSupervisor<C>
where
	C: Connector,
{
	connector: Arc<C>,
	endpoint: Endpoint,
	initializer: ChannelInitializer,
	dial_policy: BackoffPolicy,
	init_policy: BackoffPolicy,
	readiness_poll: Duration,
	shared: Arc<Shared<C::Connection>>,
	events: broadcast::Sender<LifecycleEvent>,
	shutdown: CancellationToken,
}
impl<C> ConnectionSupervisor<C>
where
	C: Connector,
{
	/// Creates a supervisor for `endpoint` using the queue, bindings, and timings in `config`.
	pub fn new(
		connector: C,
		endpoint: Endpoint,
		config: &SinkConfig,
		shutdown: CancellationToken,
	) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);

		Self {
			connector: Arc::new(connector),
			endpoint,
			initializer: ChannelInitializer::new(config.queue.clone(), config.bindings.clone()),
			dial_policy: config.tunables.dial_backoff,
			init_policy: config.tunables.init_backoff,
			readiness_poll: config.tunables.readiness_poll,
			shared: Arc::new(Shared::new()),
			events,
			shutdown,
		}
	}

	/// Subscribes to lifecycle events. Subscribe before [`Self::spawn`] to see every event.
	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.events.subscribe()
	}

	/// Gate handing out delivery streams once ready.
	pub fn gate(&self) -> DeliveryGate<C::Connection> {
		DeliveryGate::new(self.shared.clone(), self.readiness_poll, self.shutdown.clone())
	}

	/// Current lifecycle state.
	pub fn state(&self) -> ConnectionState {
		self.shared.state()
	}

	/// Runs the supervisor on its own task.
	pub fn spawn(self) -> JoinHandle<Result<()>> {
		tokio::spawn(self.run())
	}

	/// Runs until shutdown (`Ok`) or an access refusal (`Err` with a fatal connection error).
	pub async fn run(self) -> Result<()> {
		let result = self.supervise().await;

		self.shared.stop();

		result
	}

	async fn supervise(&self) -> Result<()> {
		let mut backoff = self.dial_policy.start();

		loop {
			self.shared.clear_ready();
			self.transition(Trigger::Dial);

			let span = FlowSpan::new(FlowKind::Connect, "supervise");
			let attempt = tokio::select! {
				biased;
				_ = self.shutdown.cancelled() => return Ok(self.release().await),
				attempt = span.instrument(self.connector.connect(&self.endpoint)) => attempt,
			};

			match attempt.map_err(ConnectionError::classify) {
				Ok(connection) => {
					obs::record_flow_outcome(FlowKind::Connect, obs::FlowOutcome::Success);
					backoff.reset();
					self.transition(Trigger::Connected);

					tracing::info!(endpoint = %self.endpoint, "Connected.");

					match self.serve(Arc::new(connection)).await {
						Exit::Shutdown => return Ok(()),
						Exit::ConnectionLost => continue,
					}
				},
				Err(err @ ConnectionError::Fatal { .. }) => {
					obs::record_flow_outcome(FlowKind::Connect, obs::FlowOutcome::Failure);
					self.transition(Trigger::AccessRefused);

					tracing::error!(error = ?err, "Broker denied access.");

					return Err(err.into());
				},
				Err(err) => {
					obs::record_flow_outcome(FlowKind::Connect, obs::FlowOutcome::Failure);
					self.transition(Trigger::DialFailed);

					let delay = backoff.next_delay();

					tracing::warn!(error = ?err, ?delay, "Failed to connect; retrying.");

					if !self.pause(delay).await {
						return Ok(self.release().await);
					}
				},
			}
		}
	}

	// Inner loop: (re)initialize channels on one connection until it closes or shutdown.
	async fn serve(&self, connection: Arc<C::Connection>) -> Exit {
		let mut connection_closed = self.initializer.watch_connection(connection.as_ref());
		let mut backoff = self.init_policy.start();

		self.shared.install_connection(connection.clone());

		loop {
			self.shared.clear_ready();

			let span = FlowSpan::new(FlowKind::ChannelInit, "serve");
			let initialized = tokio::select! {
				biased;
				_ = self.shutdown.cancelled() => {
					self.release().await;

					return Exit::Shutdown;
				},
				reason = connection_closed.closed() => {
					self.connection_lost(&reason);

					return Exit::ConnectionLost;
				},
				initialized = span.instrument(self.initializer.initialize(connection.as_ref())) =>
					initialized,
			};
			let mut channel_closed = match initialized {
				Ok(ready) => {
					backoff.reset();
					self.shared.publish_ready(Arc::new(ready.channel), ready.queue);
					obs::record_flow_outcome(FlowKind::ChannelInit, obs::FlowOutcome::Success);
					self.transition(Trigger::ChannelReady);

					tracing::info!("Channel ready.");

					ready.closed
				},
				Err(err) => {
					obs::record_flow_outcome(FlowKind::ChannelInit, obs::FlowOutcome::Failure);
					self.transition(Trigger::ChannelInitFailed);

					let delay = backoff.next_delay();

					tracing::warn!(error = ?err, ?delay, "Failed to initialize channel; retrying.");

					tokio::select! {
						biased;
						_ = self.shutdown.cancelled() => {
							self.release().await;

							return Exit::Shutdown;
						},
						reason = connection_closed.closed() => {
							self.connection_lost(&reason);

							return Exit::ConnectionLost;
						},
						_ = tokio::time::sleep(delay) => continue,
					}
				},
			};

			if let Some(exit) = self.watch(&mut connection_closed, &mut channel_closed).await {
				return exit;
			}
		}
	}

	// Parks while ready; `None` means the channel closed and should be re-initialized.
	async fn watch(
		&self,
		connection_closed: &mut CloseWatch,
		channel_closed: &mut CloseWatch,
	) -> Option<Exit> {
		tokio::select! {
			biased;
			_ = self.shutdown.cancelled() => {
				self.release().await;

				Some(Exit::Shutdown)
			},
			reason = connection_closed.closed() => {
				self.connection_lost(&reason);

				Some(Exit::ConnectionLost)
			},
			reason = channel_closed.closed() => {
				self.shared.clear_ready();
				self.transition(Trigger::ChannelClosed);

				tracing::warn!(%reason, "Channel closed; re-running initialization.");

				None
			},
		}
	}

	// Returns false when shutdown interrupted the wait.
	async fn pause(&self, delay: Duration) -> bool {
		tokio::select! {
			biased;
			_ = self.shutdown.cancelled() => false,
			_ = tokio::time::sleep(delay) => true,
		}
	}

	fn connection_lost(&self, reason: &str) {
		let _ = self.shared.take_handles();

		self.transition(Trigger::ConnectionClosed);

		tracing::warn!(%reason, "Connection closed; reconnecting.");
	}

	// Closes the channel, then the connection, outside the lock.
	async fn release(&self) {
		let (channel, connection) = self.shared.take_handles();

		if let Some(channel) = channel {
			if let Err(e) = close_within(channel.close()).await {
				tracing::debug!(error = %e, "Channel close failed during shutdown.");
			}
		}
		if let Some(connection) = connection {
			if let Err(e) = close_within(connection.close()).await {
				tracing::debug!(error = %e, "Connection close failed during shutdown.");
			}
		}

		self.transition(Trigger::Shutdown);

		tracing::info!("Supervisor stopped.");
	}

	fn transition(&self, trigger: Trigger) {
		let Some(event) = self.shared.apply(trigger) else {
			tracing::error!(state = %self.shared.state(), %trigger, "Ignored undefined transition.");

			return;
		};

		obs::record_transition(event.from, event.to);

		tracing::debug!(from = %event.from, %trigger, to = %event.to, "Lifecycle transition.");

		let _ = self.events.send(event);
	}
}
impl<C> Debug for ConnectionSupervisor<C>
where
	C: Connector,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConnectionSupervisor")
			.field("endpoint", &self.endpoint)
			.field("initializer", &self.initializer)
			.field("state", &self.shared.state())
			.finish_non_exhaustive()
	}
}

async fn close_within<F>(close: F) -> Result<(), BoxError>
where
	F: Future<Output = Result<(), crate::consumer::BrokerError>>,
{
	match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
		Ok(result) => result.map_err(Into::into),
		Err(elapsed) => Err(elapsed.into()),
	}
}
