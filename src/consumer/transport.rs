//! Broker transport seam.
//!
//! The supervisor only talks to the broker through [`Connector`], [`BrokerConnection`], and
//! [`BrokerChannel`]; `lapin` backs them in production and an in-memory fake backs them in tests.
//! Every operation returns a boxed `Send` future so implementations can own their state across
//! `.await` points.

// crates.io
use futures::Stream;
use tokio::sync::mpsc;
// self
use crate::{_prelude::*, auth::Endpoint, binding::Binding, config::QueueSpec, consumer::Delivery};

/// Future returned by transport operations.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + 'a + Send>>;

/// Live sequence of deliveries; ends when the channel closes.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

/// Transport failure reported by the broker or the network.
#[derive(Debug, ThisError)]
pub enum BrokerError {
	/// The broker refused the credentials or the virtual host.
	#[error("Broker refused access.")]
	AccessRefused {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Any other failure.
	#[error("Broker operation failed.")]
	Operation {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
}
impl BrokerError {
	/// Wraps an access refusal.
	pub fn access_refused(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::AccessRefused { source: Box::new(src) }
	}

	/// Wraps any other failure.
	pub fn operation(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Operation { source: Box::new(src) }
	}

	/// Returns true for [`BrokerError::AccessRefused`].
	pub fn is_access_refused(&self) -> bool {
		matches!(self, Self::AccessRefused { .. })
	}
}

/// Sending half of a close notification, handed to a connection or channel.
#[derive(Clone, Debug)]
pub struct CloseSignal(mpsc::UnboundedSender<String>);
impl CloseSignal {
	/// Reports that the resource closed.
	pub fn notify(&self, reason: impl Into<String>) {
		let _ = self.0.send(reason.into());
	}
}

/// Receiving half of a close notification.
#[derive(Debug)]
pub struct CloseWatch(mpsc::UnboundedReceiver<String>);
impl CloseWatch {
	/// Resolves with the close reason. A dropped signal counts as a close.
	pub async fn closed(&mut self) -> String {
		self.0.recv().await.unwrap_or_else(|| "close notifier dropped".into())
	}
}

/// Creates a linked close signal and watcher.
pub fn close_signal() -> (CloseSignal, CloseWatch) {
	let (tx, rx) = mpsc::unbounded_channel();

	(CloseSignal(tx), CloseWatch(rx))
}

/// Dials broker connections.
pub trait Connector
where
	Self: 'static + Send + Sync,
{
	/// Connection type produced by [`Connector::connect`].
	type Connection: BrokerConnection;

	/// Opens a connection to `endpoint`.
	fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BrokerFuture<'a, Self::Connection>;
}

/// Established broker connection.
pub trait BrokerConnection
where
	Self: 'static + Send + Sync,
{
	/// Channel type opened on this connection.
	type Channel: BrokerChannel;

	/// Installs `signal`, fired when the connection closes asynchronously.
	fn on_close(&self, signal: CloseSignal);

	/// Opens a new channel.
	fn open_channel(&self) -> BrokerFuture<'_, Self::Channel>;

	/// Closes the connection.
	fn close(&self) -> BrokerFuture<'_, ()>;
}

/// Channel on an established connection.
pub trait BrokerChannel
where
	Self: 'static + Send + Sync,
{
	/// Installs `signal`, fired when the channel closes asynchronously.
	fn on_close(&self, signal: CloseSignal);

	/// Puts the channel into publisher-confirm mode.
	fn enable_confirms(&self) -> BrokerFuture<'_, ()>;

	/// Declares (or passively verifies) `queue` and returns the name the broker reports.
	fn declare_queue<'a>(&'a self, queue: &'a QueueSpec) -> BrokerFuture<'a, String>;

	/// Passively checks that `exchange` exists as a topic exchange.
	fn verify_topic_exchange<'a>(&'a self, exchange: &'a str) -> BrokerFuture<'a, ()>;

	/// Binds `queue` to the binding's exchange with its routing key.
	fn bind_queue<'a>(&'a self, queue: &'a str, binding: &'a Binding) -> BrokerFuture<'a, ()>;

	/// Limits unacknowledged deliveries in flight.
	fn set_prefetch(&self, count: u16) -> BrokerFuture<'_, ()>;

	/// Starts an auto-acknowledged consumer on `queue`.
	fn consume<'a>(&'a self, queue: &'a str) -> BrokerFuture<'a, DeliveryStream>;

	/// Closes the channel.
	fn close(&self) -> BrokerFuture<'_, ()>;
}
