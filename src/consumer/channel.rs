//! Channel, queue, and binding setup on an established connection.

// self
use crate::{
	_prelude::*,
	binding::BindingSet,
	config::QueueSpec,
	consumer::{BrokerChannel, BrokerConnection, BrokerError, CloseWatch, close_signal},
};

/// Channel that finished initialization, with its close watcher.
#[derive(Debug)]
pub struct InitializedChannel<Ch> {
	/// The channel.
	pub channel: Ch,
	/// Queue name reported by the broker.
	pub queue: String,
	/// Fires when the channel closes.
	pub closed: CloseWatch,
}

/// (Re)declares the sink's queue and bindings.
#[derive(Clone, Debug)]
pub struct ChannelInitializer {
	queue: QueueSpec,
	bindings: BindingSet,
}
impl ChannelInitializer {
	/// Creates an initializer for `queue` and `bindings`.
	pub fn new(queue: QueueSpec, bindings: BindingSet) -> Self {
		Self { queue, bindings }
	}

	/// Installs a close watcher on `connection`.
	pub fn watch_connection<C>(&self, connection: &C) -> CloseWatch
	where
		C: BrokerConnection,
	{
		let (signal, watch) = close_signal();

		connection.on_close(signal);

		watch
	}

	/// Opens a channel and establishes the queue and every binding on it.
	///
	/// The first failing step aborts; bindings made before it are not rolled back and the
	/// half-open channel is closed best-effort.
	pub async fn initialize<C>(
		&self,
		connection: &C,
	) -> Result<InitializedChannel<C::Channel>, BrokerError>
	where
		C: BrokerConnection,
	{
		let channel = connection.open_channel().await?;
		let (signal, closed) = close_signal();

		channel.on_close(signal);

		match self.declare(&channel).await {
			Ok(queue) => Ok(InitializedChannel { channel, queue, closed }),
			Err(e) => {
				let _ = channel.close().await;

				Err(e)
			},
		}
	}

	async fn declare<Ch>(&self, channel: &Ch) -> Result<String, BrokerError>
	where
		Ch: BrokerChannel,
	{
		channel.enable_confirms().await?;

		let queue = channel.declare_queue(&self.queue).await?;

		for binding in &self.bindings {
			channel.verify_topic_exchange(&binding.exchange).await?;
			channel.bind_queue(&queue, binding).await?;

			tracing::info!(
				exchange = %binding.exchange,
				routing_key = %binding.routing_key,
				"Listening on exchange."
			);
		}

		Ok(queue)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::FakeBroker;

	fn initializer(bindings: &str) -> ChannelInitializer {
		ChannelInitializer::new(
			QueueSpec::Transient { name: "coyote.test".into() },
			BindingSet::parse(bindings).expect("Binding fixture should parse."),
		)
	}

	#[tokio::test]
	async fn declares_queue_then_checks_and_binds_each_exchange() {
		let broker = FakeBroker::with_exchanges(["orders", "audit"]);
		let connection = broker.connection();
		let ready = initializer("orders=eu.*,audit")
			.initialize(&connection)
			.await
			.expect("Initialization should succeed.");

		assert_eq!(ready.queue, "coyote.test");
		assert_eq!(
			broker.log(),
			[
				"open_channel",
				"confirm_select",
				"queue_declare coyote.test transient",
				"exchange_check audit",
				"queue_bind coyote.test audit #",
				"exchange_check orders",
				"queue_bind coyote.test orders eu.*",
			]
		);
	}

	#[tokio::test]
	async fn missing_exchange_aborts_without_rollback() {
		let broker = FakeBroker::with_exchanges(["audit"]);
		let connection = broker.connection();
		let err = initializer("audit,orders")
			.initialize(&connection)
			.await
			.expect_err("Missing exchange should abort.");

		assert!(!err.is_access_refused());

		let log = broker.log();

		assert!(log.contains(&"queue_bind coyote.test audit #".to_owned()));
		assert!(!log.iter().any(|entry| entry.starts_with("queue_unbind")));
		assert_eq!(log.last().map(String::as_str), Some("channel_close"));
	}
}
