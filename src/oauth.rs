//! OAuth 2.0 Authorization Code + PKCE login against the broker's identity provider.
//!
//! The flow discovers the broker's auth settings, lets the operator pick a resource server,
//! reads the provider's OpenID configuration, then serves the redirect URL locally while the
//! operator grants consent in a browser. The resulting access token becomes the broker password,
//! with the client identifier as username.

pub mod browser;
pub mod callback;
pub mod discovery;
pub mod exchange;
pub mod session;

pub use browser::*;
pub use callback::*;
pub use discovery::*;
pub use exchange::*;
pub use session::*;

// self
use crate::{
	_prelude::*,
	auth::{Endpoint, Prompter, prompt_until_shutdown},
	config::BrokerScheme,
	http::ReqwestHttpClient,
	obs::{FlowKind, FlowSpan},
};

/// One OAuth 2.0 login attempt.
#[derive(Clone)]
pub struct OAuthFlow {
	http: ReqwestHttpClient,
	prompter: Arc<dyn Prompter>,
	browser: Arc<dyn BrowserLauncher>,
	callback_timeout: Duration,
}
impl OAuthFlow {
	/// Default bound on the consent round trip.
	pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

	/// Creates a flow from its collaborators.
	pub fn new(
		http: ReqwestHttpClient,
		prompter: Arc<dyn Prompter>,
		browser: Arc<dyn BrowserLauncher>,
	) -> Self {
		Self { http, prompter, browser, callback_timeout: Self::DEFAULT_CALLBACK_TIMEOUT }
	}

	/// Overrides the consent round-trip bound.
	pub fn callback_timeout(mut self, timeout: Duration) -> Self {
		self.callback_timeout = timeout;

		self
	}

	/// Runs discovery, consent, and token exchange, returning an authenticated endpoint.
	pub async fn run(
		&self,
		broker_url: &Url,
		scheme: BrokerScheme,
		redirect_url: &Url,
		shutdown: &CancellationToken,
	) -> Result<Endpoint> {
		let discovery = AuthDiscovery::new(self.http.clone());
		let (config, server, metadata) = FlowSpan::new(FlowKind::Discovery, "run")
			.observe(async {
				let config = discovery.fetch_auth_config(broker_url, scheme).await?;
				let server = {
					let config = config.clone();

					prompt_until_shutdown(&self.prompter, shutdown, move |prompter| {
						choose_resource_server(&config, prompter)
					})
					.await?
				};

				tracing::info!(resource_server = %server.id, "Chosen resource server.");

				let metadata = discovery.fetch_openid_metadata(&server).await?;

				Ok::<_, Error>((config, server, metadata))
			})
			.await?;
		let session = PkceSession::start(
			&metadata.authorization_endpoint,
			&ConsentRequest {
				client_id: &config.oauth_client_id,
				redirect_url,
				scopes: config.scopes().collect(),
				resource_server: &server.id,
			},
		);
		let consent_url = session.consent_url().clone();
		let exchanger = TokenExchanger::new(
			&metadata,
			&config.oauth_client_id,
			redirect_url,
			self.http.clone(),
		)?;
		let token = FlowSpan::new(FlowKind::Authorize, "run")
			.observe(async {
				let listener = CallbackListener::bind(session, exchanger).await?;

				self.offer(&consent_url);

				listener.wait(self.callback_timeout, shutdown).await
			})
			.await?;

		tracing::info!(token_type = %token.token_type, "Authentication successful.");

		Ok(Endpoint::with_credentials(broker_url, &config.oauth_client_id, &token.access_token)?)
	}

	fn offer(&self, consent_url: &Url) {
		tracing::info!(
			%consent_url,
			"Opening browser for authentication; if it does not open, visit the URL manually."
		);

		if let Err(e) = self.browser.open(consent_url) {
			tracing::warn!(error = %e, "Failed to open browser automatically.");
		}
	}
}
impl Debug for OAuthFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthFlow")
			.field("http", &self.http)
			.field("callback_timeout", &self.callback_timeout)
			.finish_non_exhaustive()
	}
}
