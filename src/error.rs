//! Sink-level error types shared across authentication, discovery, and the consumer.

// self
use crate::{_prelude::*, binding::BindingError, consumer::BrokerError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed, thread-safe error used wherever the concrete cause depends on a transport.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// OAuth 2.0 discovery failed.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// The authorization redirect was rejected.
	#[error(transparent)]
	Callback(#[from] CallbackError),
	/// Broker connection failure.
	#[error(transparent)]
	Connection(#[from] ConnectionError),
	/// Interactive prompt failure.
	#[error(transparent)]
	Prompt(#[from] PromptError),

	/// No authorization redirect arrived in time.
	#[error("No OAuth 2.0 callback arrived within {}s.", timeout.as_secs())]
	CallbackTimeout {
		/// Configured wait bound.
		timeout: Duration,
	},
	/// The consumer is not connected and will not become ready.
	#[error("Not connected to the broker.")]
	NotConnected,
	/// The operation was interrupted by shutdown.
	#[error("Operation cancelled by shutdown.")]
	Cancelled,
}
impl Error {
	/// Returns true when the error stems from the broker refusing access.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Connection(ConnectionError::Fatal { .. }))
	}
}

/// Configuration and validation failures raised before any broker traffic.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Broker URL cannot be parsed.
	#[error("Broker URL is invalid.")]
	InvalidBrokerUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Broker URL uses an unsupported scheme.
	#[error("Broker URL must start with amqp:// or amqps://, got `{scheme}://`.")]
	UnsupportedScheme {
		/// Offending scheme.
		scheme: String,
	},
	/// Broker URL has no host.
	#[error("Broker URL is missing a host.")]
	MissingHost,
	/// Broker URL cannot carry credentials.
	#[error("Broker URL cannot carry credentials.")]
	CredentialsRejected,
	/// OAuth 2.0 requires an explicit redirect URL.
	#[error("OAuth 2.0 login requires an explicit redirect URL.")]
	MissingRedirectUrl,
	/// Redirect URL cannot host the local callback listener.
	#[error("Redirect URL `{url}` cannot host a local callback listener: {reason}.")]
	InvalidRedirectUrl {
		/// Offending redirect URL.
		url: String,
		/// Why the URL was rejected.
		reason: &'static str,
	},
	/// Discovered OAuth endpoint cannot be used.
	#[error("Discovered {endpoint} endpoint is invalid.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Binding syntax is invalid.
	#[error(transparent)]
	Binding(#[from] BindingError),
	/// No binding was configured.
	#[error("At least one exchange binding is required.")]
	NoBindings,
	/// Persistent queue name is blank.
	#[error("Queue name cannot be blank.")]
	BlankQueue,
	/// TLS settings for the broker connection could not be built.
	#[error("AMQP TLS configuration could not be built.")]
	TlsBuild {
		/// Underlying rustls failure.
		#[source]
		source: rustls::Error,
	},
	/// Callback listener socket could not be bound.
	#[error("Callback listener could not bind {addr}.")]
	CallbackBind {
		/// Requested socket address.
		addr: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// OAuth 2.0 discovery failures; the flow aborts without retrying.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// Request never produced a response.
	#[error("Failure while connecting to {url}.")]
	Network {
		/// Requested document.
		url: String,
		/// Transport failure.
		#[source]
		source: BoxError,
	},
	/// Server answered with a non-200 status.
	#[error("Unexpected HTTP status {status} from {url}.")]
	Status {
		/// Requested document.
		url: String,
		/// Returned HTTP status.
		status: u16,
	},
	/// Body is empty.
	#[error("Received an empty document from {url}.")]
	Empty {
		/// Requested document.
		url: String,
	},
	/// Body is not the expected JSON document.
	#[error("Malformed JSON document from {url}.")]
	Decode {
		/// Requested document.
		url: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Server reported OAuth 2.0 as disabled.
	#[error("OAuth 2.0 is not enabled on the server.")]
	OAuthDisabled,
	/// Server advertises no resource servers.
	#[error("Server advertises no OAuth 2.0 resource servers.")]
	NoResourceServers,
	/// Operator picked the `none` option.
	#[error("No OAuth 2.0 resource server chosen.")]
	NoResourceServerChosen,
	/// Provider URL of the chosen resource server is unusable.
	#[error("Provider URL `{url}` of resource server `{id}` is invalid.")]
	InvalidProviderUrl {
		/// Resource server identifier.
		id: String,
		/// Offending provider URL.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Rejections of the authorization redirect; each aborts the current attempt.
#[derive(Debug, ThisError)]
pub enum CallbackError {
	/// `state` does not match the session.
	#[error("State parameter doesn't match.")]
	StateMismatch,
	/// Authorization server reported an error.
	#[error("Authorization server returned error: {error} - {description}.")]
	Provider {
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, or an empty string.
		description: String,
	},
	/// `code` is absent.
	#[error("Code parameter missing in callback.")]
	MissingCode,
	/// Token endpoint rejected the exchange.
	#[error("Token exchange failed: {message}.")]
	Exchange {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Transport or parsing failure, when available.
		#[source]
		source: Option<BoxError>,
	},
	/// Listener stopped before publishing an outcome.
	#[error("Callback listener stopped before receiving a redirect.")]
	ListenerClosed,
}

/// Broker connection failures split by whether retrying can help.
#[derive(Debug, ThisError)]
pub enum ConnectionError {
	/// Broker denied access; the consumer stops.
	#[error("Broker denied access; giving up.")]
	Fatal {
		/// Broker-reported cause.
		#[source]
		source: BrokerError,
	},
	/// Any other failure; the supervisor backs off and retries.
	#[error("Broker connection failed; will retry.")]
	Retryable {
		/// Broker-reported cause.
		#[source]
		source: BrokerError,
	},
}
impl ConnectionError {
	/// Classifies a broker failure; only an access refusal is fatal.
	pub fn classify(source: BrokerError) -> Self {
		if source.is_access_refused() {
			Self::Fatal { source }
		} else {
			Self::Retryable { source }
		}
	}

	/// Returns true for [`ConnectionError::Fatal`].
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Fatal { .. })
	}
}

/// Terminal prompt failure.
#[derive(Debug, ThisError)]
#[error("Failed to read `{label}` from the terminal.")]
pub struct PromptError {
	/// Prompt label.
	pub label: String,
	/// Underlying terminal failure.
	#[source]
	pub source: BoxError,
}
impl PromptError {
	/// Wraps a terminal failure for the given prompt.
	pub fn new(label: impl Into<String>, src: impl 'static + Send + Sync + StdError) -> Self {
		Self { label: label.into(), source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn classification_only_treats_access_refusal_as_fatal() {
		let refused = ConnectionError::classify(BrokerError::access_refused(
			std::io::Error::other("ACCESS_REFUSED"),
		));
		let reset = ConnectionError::classify(BrokerError::operation(std::io::Error::other(
			"connection reset",
		)));

		assert!(refused.is_fatal());
		assert!(!reset.is_fatal());
		assert!(Error::from(refused).is_fatal());
		assert!(StdError::source(&reset).is_some());
	}

	#[test]
	fn timeout_message_names_the_bound() {
		let err = Error::CallbackTimeout { timeout: Duration::from_secs(60) };

		assert_eq!(err.to_string(), "No OAuth 2.0 callback arrived within 60s.");
	}
}
