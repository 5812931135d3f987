//! Broker auth settings and provider metadata discovery.

// self
use crate::{
	_prelude::*,
	auth::{Choice, Prompter},
	config::BrokerScheme,
	error::DiscoveryError,
	http::ReqwestHttpClient,
};

const AUTH_CONFIG_PATH: &str = "/api/auth";
const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// OAuth 2.0 settings advertised by the broker's management API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct OAuthConfig {
	/// Whether OAuth 2.0 logins are enabled.
	#[serde(default)]
	pub oauth_enabled: bool,
	/// Resource servers keyed by identifier.
	#[serde(default)]
	pub oauth_resource_servers: Option<BTreeMap<String, ResourceServer>>,
	/// Whether username/password logins are disabled.
	#[serde(default)]
	pub oauth_disable_basic_auth: bool,
	/// Public client identifier.
	#[serde(default)]
	pub oauth_client_id: String,
	/// Space-delimited scopes to request.
	#[serde(default)]
	pub oauth_scopes: String,
}
impl OAuthConfig {
	/// Individual scopes, skipping empty entries.
	pub fn scopes(&self) -> impl Iterator<Item = &str> {
		self.oauth_scopes.split(' ').filter(|scope| !scope.is_empty())
	}

	/// Resource servers in identifier order, with map keys as their identifiers.
	pub fn resource_servers(&self) -> Vec<ResourceServer> {
		self.oauth_resource_servers
			.iter()
			.flatten()
			.map(|(id, server)| ResourceServer {
				id: id.clone(),
				oauth_provider_url: server.oauth_provider_url.clone(),
			})
			.collect()
	}
}

/// OAuth 2.0 protected audience exposed by the broker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceServer {
	/// Resource server identifier, used as `audience` and `resource`.
	#[serde(default)]
	pub id: String,
	/// Base URL of the identity provider.
	#[serde(default)]
	pub oauth_provider_url: String,
}

/// Endpoints read from the provider's OpenID configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OpenIdMetadata {
	/// Authorization (consent) endpoint.
	pub authorization_endpoint: Url,
	/// Token endpoint.
	pub token_endpoint: Url,
}

/// Fetches the two discovery documents.
#[derive(Clone, Debug)]
pub struct AuthDiscovery {
	http: ReqwestHttpClient,
}
impl AuthDiscovery {
	/// Creates a discovery client.
	pub fn new(http: ReqwestHttpClient) -> Self {
		Self { http }
	}

	/// URL of the broker's auth settings: same host and port, HTTP(S) matching the broker scheme.
	pub fn auth_config_url(broker_url: &Url, scheme: BrokerScheme) -> String {
		let host = broker_url.host_str().unwrap_or_default();

		match broker_url.port() {
			Some(port) => format!("{}://{host}:{port}{AUTH_CONFIG_PATH}", scheme.http_scheme()),
			None => format!("{}://{host}{AUTH_CONFIG_PATH}", scheme.http_scheme()),
		}
	}

	/// Fetches the broker's OAuth 2.0 settings, failing unless OAuth 2.0 is enabled.
	pub async fn fetch_auth_config(
		&self,
		broker_url: &Url,
		scheme: BrokerScheme,
	) -> Result<OAuthConfig, DiscoveryError> {
		let url = Self::auth_config_url(broker_url, scheme);
		let config: OAuthConfig = self.fetch_json(&url).await?;

		if !config.oauth_enabled {
			return Err(DiscoveryError::OAuthDisabled);
		}

		tracing::debug!(
			client_id = %config.oauth_client_id,
			resource_servers = config.oauth_resource_servers.as_ref().map_or(0, BTreeMap::len),
			basic_auth_disabled = config.oauth_disable_basic_auth,
			"Fetched broker auth settings."
		);

		Ok(config)
	}

	/// Fetches `<provider>/.well-known/openid-configuration`.
	pub async fn fetch_openid_metadata(
		&self,
		server: &ResourceServer,
	) -> Result<OpenIdMetadata, DiscoveryError> {
		let base = server.oauth_provider_url.trim_end_matches('/');
		let url = format!("{base}{OPENID_CONFIGURATION_PATH}");

		Url::parse(&url).map_err(|source| DiscoveryError::InvalidProviderUrl {
			id: server.id.clone(),
			url: server.oauth_provider_url.clone(),
			source,
		})?;

		self.fetch_json(&url).await
	}

	async fn fetch_json<T>(&self, url: &str) -> Result<T, DiscoveryError>
	where
		T: for<'de> Deserialize<'de>,
	{
		let network = |e: ReqwestError| DiscoveryError::Network { url: url.into(), source: e.into() };
		let response = self.http.discovery().get(url).send().await.map_err(network)?;
		let status = response.status();

		if status.as_u16() != 200 {
			return Err(DiscoveryError::Status { url: url.into(), status: status.as_u16() });
		}

		let body = response.bytes().await.map_err(network)?;

		if body.iter().all(u8::is_ascii_whitespace) || body.as_ref() == b"null" {
			return Err(DiscoveryError::Empty { url: url.into() });
		}

		let mut de = serde_json::Deserializer::from_slice(&body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| DiscoveryError::Decode { url: url.into(), source })
	}
}

/// Label of the synthetic menu entry that aborts the flow.
pub const NO_RESOURCE_SERVER: &str = "none";

/// Asks the operator to pick a resource server; the trailing `none` entry aborts.
pub fn choose_resource_server(
	config: &OAuthConfig,
	prompter: &dyn Prompter,
) -> Result<ResourceServer> {
	let servers = config.resource_servers();

	if servers.is_empty() {
		return Err(DiscoveryError::NoResourceServers.into());
	}

	let mut choices = servers
		.iter()
		.map(|server| Choice::new(&server.id, &server.oauth_provider_url))
		.collect::<Vec<_>>();

	choices.push(Choice::new(NO_RESOURCE_SERVER, "Quits the program"));

	let picked = prompter.choose("Choose an OAuth 2.0 resource server:", &choices)?;

	servers.into_iter().nth(picked).ok_or_else(|| DiscoveryError::NoResourceServerChosen.into())
}
