//! Sink configuration and its validating builder.

// self
use crate::{
	_prelude::*,
	binding::BindingSet,
	consumer::BackoffPolicy,
	error::ConfigError,
};

/// Broker URL schemes understood by the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerScheme {
	/// Plaintext AMQP.
	Amqp,
	/// AMQP over TLS.
	Amqps,
}
impl BrokerScheme {
	/// Parses a URL scheme.
	pub fn from_url(url: &Url) -> Result<Self, ConfigError> {
		match url.scheme() {
			"amqp" => Ok(Self::Amqp),
			"amqps" => Ok(Self::Amqps),
			other => Err(ConfigError::UnsupportedScheme { scheme: other.into() }),
		}
	}

	/// HTTP scheme of the management API served next to the broker.
	pub const fn http_scheme(self) -> &'static str {
		match self {
			Self::Amqp => "http",
			Self::Amqps => "https",
		}
	}
}

/// Queue the sink consumes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueSpec {
	/// Server-side temporary queue, removed when the connection closes.
	Transient {
		/// Generated queue name.
		name: String,
	},
	/// Named queue that outlives the sink.
	Persistent {
		/// Queue name.
		name: String,
		/// Only verify the queue exists instead of declaring it.
		passive: bool,
	},
}
impl QueueSpec {
	/// Prefix of generated transient queue names.
	pub const TRANSIENT_PREFIX: &'static str = "coyote";

	/// Generates a fresh transient queue name.
	pub fn transient() -> Self {
		Self::Transient { name: format!("{}.{}", Self::TRANSIENT_PREFIX, uuid::Uuid::new_v4()) }
	}

	/// Queue name.
	pub fn name(&self) -> &str {
		match self {
			Self::Transient { name } | Self::Persistent { name, .. } => name,
		}
	}

	/// Returns true if the queue survives the sink.
	pub fn is_persistent(&self) -> bool {
		matches!(self, Self::Persistent { .. })
	}
}

/// Timing knobs; defaults match production behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tunables {
	/// Bound on the OAuth 2.0 consent round trip.
	pub callback_timeout: Duration,
	/// Backoff between connection attempts.
	pub dial_backoff: BackoffPolicy,
	/// Backoff between channel initialization attempts.
	pub init_backoff: BackoffPolicy,
	/// Interval between readiness checks in the delivery gate.
	pub readiness_poll: Duration,
	/// AMQP heartbeat interval.
	pub heartbeat: Duration,
	/// TCP/AMQP handshake timeout.
	pub connection_timeout: Duration,
}
impl Default for Tunables {
	fn default() -> Self {
		Self {
			callback_timeout: Duration::from_secs(60),
			dial_backoff: BackoffPolicy::default(),
			init_backoff: BackoffPolicy::default(),
			readiness_poll: Duration::from_secs(1),
			heartbeat: Duration::from_secs(10),
			connection_timeout: Duration::from_secs(5),
		}
	}
}

/// Validated sink configuration.
#[derive(Clone, Debug)]
pub struct SinkConfig {
	/// Broker URL as given; credentials may still be missing.
	pub broker_url: Url,
	/// Scheme of [`Self::broker_url`].
	pub scheme: BrokerScheme,
	/// Bindings to establish on every channel.
	pub bindings: BindingSet,
	/// Queue to consume from.
	pub queue: QueueSpec,
	/// Skip TLS certificate verification for HTTP calls.
	pub insecure: bool,
	/// Authenticate with OAuth 2.0 instead of username/password.
	pub oauth: bool,
	/// Redirect URL registered with the OAuth 2.0 client.
	pub redirect_url: Option<Url>,
	/// Timing knobs.
	pub tunables: Tunables,
}
impl SinkConfig {
	/// Creates a new builder for the given broker URL.
	pub fn builder(broker_url: Url) -> SinkConfigBuilder {
		SinkConfigBuilder::new(broker_url)
	}
}

/// Builder for [`SinkConfig`].
#[derive(Debug)]
pub struct SinkConfigBuilder {
	broker_url: Url,
	bindings: BindingSet,
	queue: Option<String>,
	passive_queue: bool,
	insecure: bool,
	oauth: bool,
	redirect_url: Option<Url>,
	tunables: Tunables,
}
impl SinkConfigBuilder {
	fn new(broker_url: Url) -> Self {
		Self {
			broker_url,
			bindings: BindingSet::default(),
			queue: None,
			passive_queue: false,
			insecure: false,
			oauth: false,
			redirect_url: None,
			tunables: Tunables::default(),
		}
	}

	/// Merges a parsed binding set.
	pub fn bindings(mut self, bindings: BindingSet) -> Self {
		self.bindings.merge(bindings);

		self
	}

	/// Consumes from a named queue that outlives the sink.
	pub fn queue(mut self, name: impl Into<String>) -> Self {
		self.queue = Some(name.into());

		self
	}

	/// Only verifies the named queue instead of declaring it.
	pub fn passive_queue(mut self, passive: bool) -> Self {
		self.passive_queue = passive;

		self
	}

	/// Skips TLS certificate verification for HTTP calls.
	pub fn insecure(mut self, insecure: bool) -> Self {
		self.insecure = insecure;

		self
	}

	/// Enables OAuth 2.0 authentication.
	pub fn oauth(mut self, oauth: bool) -> Self {
		self.oauth = oauth;

		self
	}

	/// Sets the OAuth 2.0 redirect URL.
	pub fn redirect_url(mut self, url: Url) -> Self {
		self.redirect_url = Some(url);

		self
	}

	/// Overrides the timing knobs.
	pub fn tunables(mut self, tunables: Tunables) -> Self {
		self.tunables = tunables;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	///
	/// A missing redirect URL is not checked here; authentication reports it before any
	/// network call.
	pub fn build(self) -> Result<SinkConfig, ConfigError> {
		let scheme = BrokerScheme::from_url(&self.broker_url)?;

		if self.broker_url.host_str().is_none_or(str::is_empty) {
			return Err(ConfigError::MissingHost);
		}
		if self.bindings.is_empty() {
			return Err(ConfigError::NoBindings);
		}

		let queue = match self.queue {
			Some(name) if name.trim().is_empty() => return Err(ConfigError::BlankQueue),
			Some(name) => QueueSpec::Persistent { name, passive: self.passive_queue },
			None => QueueSpec::transient(),
		};

		Ok(SinkConfig {
			broker_url: self.broker_url,
			scheme,
			bindings: self.bindings,
			queue,
			insecure: self.insecure,
			oauth: self.oauth,
			redirect_url: self.redirect_url,
			tunables: self.tunables,
		})
	}
}
