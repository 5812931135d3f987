//! Terminal entry point: authenticate, keep the broker connection alive, and print deliveries.

// std
use std::{process, sync::Arc};
// crates.io
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
// self
use coyote::{
	auth::{AuthNegotiator, TerminalPrompter},
	binding::BindingSet,
	cli::{self, Cli},
	config::SinkConfig,
	consumer::{AmqpConnection, AmqpConnector, ConnectionSupervisor, DeliveryGate},
	error::Error,
	http::ReqwestHttpClient,
	oauth::SystemBrowser,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let cli = Cli::parse();

	cli::init_tracing(cli.verbose)
		.map_err(|e| eyre!("Failed to install the tracing subscriber: {e}."))?;

	let config = cli.to_config()?;
	let shutdown = CancellationToken::new();
	let negotiator = AuthNegotiator::new(
		ReqwestHttpClient::new(config.insecure)?,
		Arc::new(TerminalPrompter),
		Arc::new(SystemBrowser),
	);
	let endpoint = match negotiator.negotiate(&config, &shutdown).await {
		Ok(endpoint) => endpoint,
		Err(Error::Cancelled) => return Ok(()),
		Err(e) => return Err(e.into()),
	};

	// Installed only now so Ctrl-C during the prompts keeps its default behavior.
	watch_signals(shutdown.clone());

	let supervisor = ConnectionSupervisor::new(
		AmqpConnector::new(&config.tunables, config.scheme, config.insecure)?,
		endpoint,
		&config,
		shutdown.clone(),
	);
	let gate = supervisor.gate();
	let handle = supervisor.spawn();

	consume(&gate, &config, cli.silent, &shutdown).await;

	let outcome = handle.await?;

	if config.queue.is_persistent() {
		remind_cleanup(config.queue.name(), &config.bindings);
	}

	outcome.map_err(Into::into)
}

// First Ctrl-C requests a clean shutdown; the second one exits immediately.
fn watch_signals(shutdown: CancellationToken) {
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_err() {
			return;
		}

		tracing::info!("Shutting down; press Ctrl-C again to force exit.");
		shutdown.cancel();

		if tokio::signal::ctrl_c().await.is_ok() {
			process::exit(2);
		}
	});
}

async fn consume(
	gate: &DeliveryGate<AmqpConnection>,
	config: &SinkConfig,
	silent: bool,
	shutdown: &CancellationToken,
) {
	let mut consumed = 0_u64;

	loop {
		let mut deliveries = match gate.deliveries().await {
			Ok(deliveries) => deliveries,
			Err(Error::NotConnected) => return,
			Err(e) => {
				tracing::warn!(error = %e, "Failed to start consuming; waiting for the next channel.");
				tokio::time::sleep(config.tunables.readiness_poll).await;

				continue;
			},
		};

		tracing::info!("Waiting for messages. To exit press CTRL+C.");

		loop {
			let next = tokio::select! {
				biased;
				_ = shutdown.cancelled() => return,
				next = deliveries.next() => next,
			};

			match next {
				Some(Ok(_)) if silent => {
					consumed += 1;

					eprint!("\rConsumed {consumed} messages. To exit press CTRL+C.");
				},
				Some(Ok(delivery)) => println!("{}\n", cli::render_delivery(&delivery)),
				Some(Err(e)) => {
					tracing::warn!(error = %e, "Delivery stream failed.");

					break;
				},
				None => break,
			}
		}

		tracing::warn!("Delivery stream ended; waiting for the connection to recover.");
	}
}

fn remind_cleanup(queue: &str, bindings: &BindingSet) {
	let exchanges = bindings.exchanges().join(", ");

	tracing::warn!(
		%queue,
		%exchanges,
		"Persistent queue stays bound after exit; delete it manually when done."
	);
}
