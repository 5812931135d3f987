//! Command-line surface and terminal rendering.

// crates.io
use clap::Parser;
use tracing_subscriber::EnvFilter;
// self
use crate::{
	_prelude::*,
	binding::BindingSet,
	config::SinkConfig,
	consumer::Delivery,
	error::ConfigError,
};

/// Coyote is an AMQP topic-exchange message sink.
#[derive(Debug, Parser)]
#[command(name = "coyote", version, about, long_about = None)]
pub struct Cli {
	/// Broker URL, must start with amqps:// or amqp://.
	#[arg(short, long, env = "COYOTE_URL")]
	pub url: Url,

	/// Exchange and routing key combinations to listen to, e.g. `orders=eu.*,audit`.
	#[arg(short, long = "exchange", required = true)]
	pub exchanges: Vec<BindingSet>,

	/// Named queue to consume from; it is not deleted on exit.
	#[arg(long)]
	pub queue: Option<String>,

	/// Only verify that `--queue` exists instead of declaring it.
	#[arg(long, requires = "queue")]
	pub passive_queue: bool,

	/// Skip certificate verification for HTTP discovery and token requests.
	#[arg(long)]
	pub insecure: bool,

	/// Authenticate with OAuth 2.0 instead of a username and password.
	#[arg(long)]
	pub oauth: bool,

	/// Redirect URL registered with the OAuth 2.0 client.
	#[arg(long, env = "COYOTE_REDIRECT_URL")]
	pub redirect_url: Option<Url>,

	/// Count messages instead of printing them.
	#[arg(long)]
	pub silent: bool,

	/// Log at debug level unless `RUST_LOG` says otherwise.
	#[arg(short, long)]
	pub verbose: bool,
}
impl Cli {
	/// Builds the validated sink configuration.
	pub fn to_config(&self) -> Result<SinkConfig, ConfigError> {
		let mut builder = SinkConfig::builder(self.url.clone())
			.passive_queue(self.passive_queue)
			.insecure(self.insecure)
			.oauth(self.oauth);

		for bindings in &self.exchanges {
			builder = builder.bindings(bindings.clone());
		}
		if let Some(queue) = &self.queue {
			builder = builder.queue(queue);
		}
		if let Some(redirect_url) = &self.redirect_url {
			builder = builder.redirect_url(redirect_url.clone());
		}

		builder.build()
	}
}

/// Installs the global `tracing` subscriber writing to stderr.
pub fn init_tracing(verbose: bool) -> Result<(), BoxError> {
	let default = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init()
}

/// Renders one delivery the way it is printed to the terminal.
pub fn render_delivery(delivery: &Delivery) -> String {
	let headers = delivery
		.headers
		.iter()
		.map(|(key, value)| format!("{key}: {value}"))
		.collect::<Vec<_>>()
		.join(", ");

	format!(
		"Received a message\n\
		 # Exchange        : {}\n\
		 # Routing-key     : {}\n\
		 # Correlation-id  : {}\n\
		 # Reply-to        : {}\n\
		 # Headers         : {{{headers}}}\n\
		 # Body            : {}",
		delivery.exchange,
		delivery.routing_key,
		delivery.correlation_id.as_deref().unwrap_or_default(),
		delivery.reply_to.as_deref().unwrap_or_default(),
		String::from_utf8_lossy(&delivery.body),
	)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::config::QueueSpec;

	fn parse(args: &[&str]) -> Cli {
		Cli::try_parse_from(["coyote"].iter().chain(args)).expect("Arguments should parse.")
	}

	#[test]
	fn repeated_exchanges_merge_into_one_set() {
		let config =
			parse(&["-u", "amqp://localhost", "-e", "orders=eu.*", "-e", "audit,orders=eu.*"])
				.to_config()
				.expect("Configuration should build.");

		assert_eq!(config.bindings.len(), 2);
		assert!(matches!(config.queue, QueueSpec::Transient { .. }));
	}

	#[test]
	fn named_queue_is_persistent() {
		let config = parse(&[
			"--url",
			"amqps://broker/vh",
			"--exchange",
			"audit",
			"--queue",
			"tap",
			"--passive-queue",
		])
		.to_config()
		.expect("Configuration should build.");

		assert_eq!(config.queue, QueueSpec::Persistent { name: "tap".into(), passive: true });
	}

	#[test]
	fn malformed_exchange_is_rejected_by_the_parser() {
		let result = Cli::try_parse_from(["coyote", "-u", "amqp://localhost", "-e", "=key"]);

		assert!(result.is_err());
	}

	#[test]
	fn passive_queue_requires_a_name() {
		let result = Cli::try_parse_from([
			"coyote",
			"-u",
			"amqp://localhost",
			"-e",
			"audit",
			"--passive-queue",
		]);

		assert!(result.is_err());
	}

	#[test]
	fn delivery_rendering_lists_properties_and_body() {
		let delivery = Delivery {
			exchange: "orders".into(),
			routing_key: "eu.created".into(),
			correlation_id: Some("c-1".into()),
			reply_to: None,
			headers: BTreeMap::from([("retries".to_owned(), "3".to_owned())]),
			body: b"{\"id\":1}".to_vec(),
		};
		let rendered = render_delivery(&delivery);

		assert!(rendered.contains("# Routing-key     : eu.created"));
		assert!(rendered.contains("# Correlation-id  : c-1"));
		assert!(rendered.contains("# Headers         : {retries: 3}"));
		assert!(rendered.ends_with("# Body            : {\"id\":1}"));
	}
}
