//! In-memory broker used by consumer tests.

// std
use std::{collections::VecDeque, io};
// crates.io
use futures::stream;
use tokio::{sync::mpsc, time::Instant};
// self
use crate::{
	_prelude::*,
	auth::Endpoint,
	binding::Binding,
	config::QueueSpec,
	consumer::{
		BrokerChannel, BrokerConnection, BrokerError, BrokerFuture, CloseSignal, Connector,
		Delivery, DeliveryStream,
	},
};

/// Scripted result of one dial attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialOutcome {
	/// The broker accepts the connection.
	Accept,
	/// The broker refuses the credentials.
	Refuse,
	/// The network fails.
	Fail,
}

/// Records every broker operation and lets tests drive closes and deliveries.
///
/// Clones share state. Dials not covered by the script are accepted.
#[derive(Clone, Debug, Default)]
pub struct FakeBroker(Arc<BrokerState>);
impl FakeBroker {
	/// Creates a broker that knows the given topic exchanges.
	pub fn with_exchanges<I, S>(exchanges: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let broker = Self::default();

		broker.0.exchanges.lock().extend(exchanges.into_iter().map(Into::into));

		broker
	}

	/// Scripts the outcomes of the next dials, in order.
	pub fn dials<I>(self, outcomes: I) -> Self
	where
		I: IntoIterator<Item = DialOutcome>,
	{
		self.0.dials.lock().extend(outcomes);

		self
	}

	/// Fails the next `count` queue binds.
	pub fn fail_binds(self, count: usize) -> Self {
		*self.0.bind_failures.lock() = count;

		self
	}

	/// Delays every queue bind by `delay`.
	pub fn bind_delay(self, delay: Duration) -> Self {
		*self.0.bind_delay.lock() = Some(delay);

		self
	}

	/// Hands out a connection without going through a dial.
	pub fn connection(&self) -> FakeConnection {
		FakeConnection { broker: self.clone() }
	}

	/// Connector that dials this broker.
	pub fn connector(&self) -> FakeConnector {
		FakeConnector(self.clone())
	}

	/// Operations performed so far, in order.
	pub fn log(&self) -> Vec<String> {
		self.0.log.lock().iter().map(|(_, op)| op.clone()).collect()
	}

	/// Number of logged operations equal to `op`.
	pub fn count(&self, op: &str) -> usize {
		self.0.log.lock().iter().filter(|(_, entry)| entry == op).count()
	}

	/// Instants at which operations equal to `op` started.
	pub fn instants(&self, op: &str) -> Vec<Instant> {
		self.0.log.lock().iter().filter(|(_, entry)| entry == op).map(|(at, _)| *at).collect()
	}

	/// Closes the most recent connection as if the broker dropped it.
	///
	/// Open delivery streams end, as they do when a real connection goes away.
	pub fn close_connection(&self, reason: &str) {
		self.0.consumers.lock().clear();

		if let Some(signal) = self.0.connection_signals.lock().last() {
			signal.notify(reason);
		}
	}

	/// Closes the most recent channel as if the broker dropped it; open delivery streams end.
	pub fn close_channel(&self, reason: &str) {
		self.0.consumers.lock().clear();

		if let Some(signal) = self.0.channel_signals.lock().last() {
			signal.notify(reason);
		}
	}

	/// Hands a delivery to the live consumer, or queues it for the next one.
	pub fn push_delivery(&self, delivery: Delivery) {
		let unsent = match self.0.consumers.lock().last() {
			Some(consumer) => consumer.send(delivery).err().map(|returned| returned.0),
			None => Some(delivery),
		};

		if let Some(delivery) = unsent {
			self.0.deliveries.lock().push_back(delivery);
		}
	}

	fn record(&self, op: impl Into<String>) {
		self.0.log.lock().push((Instant::now(), op.into()));
	}
}

#[derive(Debug, Default)]
struct BrokerState {
	exchanges: Mutex<BTreeSet<String>>,
	dials: Mutex<VecDeque<DialOutcome>>,
	bind_failures: Mutex<usize>,
	bind_delay: Mutex<Option<Duration>>,
	connection_signals: Mutex<Vec<CloseSignal>>,
	channel_signals: Mutex<Vec<CloseSignal>>,
	deliveries: Mutex<VecDeque<Delivery>>,
	consumers: Mutex<Vec<mpsc::UnboundedSender<Delivery>>>,
	log: Mutex<Vec<(Instant, String)>>,
}

/// [`Connector`] backed by a [`FakeBroker`].
#[derive(Clone, Debug)]
pub struct FakeConnector(FakeBroker);
impl Connector for FakeConnector {
	type Connection = FakeConnection;

	fn connect<'a>(&'a self, _: &'a Endpoint) -> BrokerFuture<'a, Self::Connection> {
		Box::pin(async move {
			let broker = &self.0;

			broker.record("dial");

			let outcome = broker.0.dials.lock().pop_front().unwrap_or(DialOutcome::Accept);

			match outcome {
				DialOutcome::Accept => Ok(broker.connection()),
				DialOutcome::Refuse => Err(BrokerError::access_refused(io::Error::new(
					io::ErrorKind::PermissionDenied,
					"ACCESS_REFUSED - Login was refused",
				))),
				DialOutcome::Fail => Err(BrokerError::operation(io::Error::new(
					io::ErrorKind::ConnectionRefused,
					"connection refused",
				))),
			}
		})
	}
}

/// Connection on a [`FakeBroker`].
#[derive(Debug)]
pub struct FakeConnection {
	broker: FakeBroker,
}
impl BrokerConnection for FakeConnection {
	type Channel = FakeChannel;

	fn on_close(&self, signal: CloseSignal) {
		self.broker.0.connection_signals.lock().push(signal);
	}

	fn open_channel(&self) -> BrokerFuture<'_, Self::Channel> {
		Box::pin(async move {
			self.broker.record("open_channel");

			Ok(FakeChannel { broker: self.broker.clone() })
		})
	}

	fn close(&self) -> BrokerFuture<'_, ()> {
		Box::pin(async move {
			self.broker.0.consumers.lock().clear();
			self.broker.record("connection_close");

			Ok(())
		})
	}
}

/// Channel on a [`FakeConnection`].
#[derive(Debug)]
pub struct FakeChannel {
	broker: FakeBroker,
}
impl BrokerChannel for FakeChannel {
	fn on_close(&self, signal: CloseSignal) {
		self.broker.0.channel_signals.lock().push(signal);
	}

	fn enable_confirms(&self) -> BrokerFuture<'_, ()> {
		Box::pin(async move {
			self.broker.record("confirm_select");

			Ok(())
		})
	}

	fn declare_queue<'a>(&'a self, queue: &'a QueueSpec) -> BrokerFuture<'a, String> {
		Box::pin(async move {
			let kind = match queue {
				QueueSpec::Transient { .. } => "transient",
				QueueSpec::Persistent { passive: true, .. } => "passive",
				QueueSpec::Persistent { passive: false, .. } => "persistent",
			};

			self.broker.record(format!("queue_declare {} {kind}", queue.name()));

			Ok(queue.name().to_owned())
		})
	}

	fn verify_topic_exchange<'a>(&'a self, exchange: &'a str) -> BrokerFuture<'a, ()> {
		Box::pin(async move {
			self.broker.record(format!("exchange_check {exchange}"));

			if self.broker.0.exchanges.lock().contains(exchange) {
				Ok(())
			} else {
				Err(BrokerError::operation(io::Error::new(
					io::ErrorKind::NotFound,
					format!("NOT_FOUND - no exchange '{exchange}'"),
				)))
			}
		})
	}

	fn bind_queue<'a>(&'a self, queue: &'a str, binding: &'a Binding) -> BrokerFuture<'a, ()> {
		Box::pin(async move {
			let delay = *self.broker.0.bind_delay.lock();

			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			{
				let mut failures = self.broker.0.bind_failures.lock();

				if *failures > 0 {
					*failures -= 1;

					drop(failures);
					self.broker.record(format!("queue_bind_failed {queue} {}", binding.exchange));

					return Err(BrokerError::operation(io::Error::other("bind failed")));
				}
			}

			self.broker.record(format!(
				"queue_bind {queue} {} {}",
				binding.exchange, binding.routing_key
			));

			Ok(())
		})
	}

	fn set_prefetch(&self, count: u16) -> BrokerFuture<'_, ()> {
		Box::pin(async move {
			self.broker.record(format!("basic_qos {count}"));

			Ok(())
		})
	}

	fn consume<'a>(&'a self, queue: &'a str) -> BrokerFuture<'a, DeliveryStream> {
		Box::pin(async move {
			self.broker.record(format!("basic_consume {queue}"));

			let (sender, receiver) = mpsc::unbounded_channel();

			for delivery in self.broker.0.deliveries.lock().drain(..) {
				let _ = sender.send(delivery);
			}

			self.broker.0.consumers.lock().push(sender);

			let stream: DeliveryStream = Box::pin(stream::unfold(receiver, |mut receiver| async move {
				receiver.recv().await.map(|delivery| (Ok(delivery), receiver))
			}));

			Ok(stream)
		})
	}

	fn close(&self) -> BrokerFuture<'_, ()> {
		Box::pin(async move {
			self.broker.0.consumers.lock().clear();
			self.broker.record("channel_close");

			Ok(())
		})
	}
}

/// Builds a delivery with a UTF-8 body.
pub fn delivery(exchange: &str, routing_key: &str, body: &str) -> Delivery {
	Delivery {
		exchange: exchange.into(),
		routing_key: routing_key.into(),
		correlation_id: None,
		reply_to: None,
		headers: BTreeMap::new(),
		body: body.as_bytes().to_vec(),
	}
}
