#![cfg(feature = "test")]

// std
use std::net::TcpListener;
// crates.io
use httpmock::prelude::*;
// self
use coyote::{
	_preludet::*,
	auth::AuthNegotiator,
	binding::BindingSet,
	config::{SinkConfig, Tunables},
	error::{CallbackError, DiscoveryError},
};

const CLIENT_ID: &str = "coyote-cli";

fn free_redirect_url() -> Url {
	let port = TcpListener::bind("127.0.0.1:0")
		.and_then(|listener| listener.local_addr())
		.expect("An ephemeral port should be available.")
		.port();

	Url::parse(&format!("http://127.0.0.1:{port}/callback"))
		.expect("Redirect URL fixture should parse.")
}

fn config(server: &MockServer, redirect_url: Url) -> SinkConfig {
	let broker_url = Url::parse(&format!("amqp://127.0.0.1:{}/%2f", server.port()))
		.expect("Broker URL fixture should parse.");

	SinkConfig::builder(broker_url)
		.bindings(BindingSet::parse("amq.topic").expect("Binding fixture should parse."))
		.oauth(true)
		.redirect_url(redirect_url)
		.tunables(Tunables { callback_timeout: Duration::from_secs(10), ..Default::default() })
		.build()
		.expect("Sink configuration fixture should build.")
}

async fn mock_discovery(server: &MockServer) {
	let provider = server.url("/realms/prod");

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/auth");
			then.status(200).header("content-type", "application/json").body(format!(
				r#"{{
					"oauth_enabled": true,
					"oauth_client_id": "{CLIENT_ID}",
					"oauth_scopes": "openid rabbitmq.read:*/*",
					"oauth_resource_servers": {{ "rabbit_prod": {{ "oauth_provider_url": "{provider}" }} }}
				}}"#
			));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/realms/prod/.well-known/openid-configuration");
			then.status(200).header("content-type", "application/json").body(format!(
				r#"{{"authorization_endpoint":"{provider}/auth","token_endpoint":"{provider}/token"}}"#
			));
		})
		.await;
}

// Plays the operator's browser: follows the consent URL straight back to the redirect URL.
fn consenting_browser(params: &'static [(&'static str, &'static str)]) -> RecordingBrowser {
	RecordingBrowser::default().on_open(move |consent_url| {
		let query = consent_url.query_pairs().into_owned().collect::<HashMap<_, _>>();
		let mut callback =
			Url::parse(&query["redirect_uri"]).expect("Consent URL should carry the redirect URL.");

		callback.query_pairs_mut().append_pair("state", &query["state"]).extend_pairs(params);

		tokio::spawn(async move {
			let _ = test_reqwest_http_client().get(callback).send().await;
		});
	})
}

#[tokio::test]
async fn consent_round_trip_yields_token_credentials() {
	let server = MockServer::start_async().await;

	mock_discovery(&server).await;

	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/realms/prod/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", "authorization_code")
				.form_urlencoded_tuple("code", "auth-code-1")
				.form_urlencoded_tuple_exists("code_verifier");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"eyJ.jwt.sig","token_type":"bearer","expires_in":300}"#,
			);
		})
		.await;
	let prompter = Arc::new(ScriptedPrompter::default().pick(0));
	let browser = Arc::new(consenting_browser(&[("code", "auth-code-1")]));
	let negotiator =
		AuthNegotiator::new(test_reqwest_http_client(), prompter.clone(), browser.clone());
	let endpoint = negotiator
		.negotiate(&config(&server, free_redirect_url()), &CancellationToken::new())
		.await
		.expect("OAuth 2.0 login should succeed.");

	token.assert_calls_async(1).await;

	assert_eq!(endpoint.username(), CLIENT_ID);
	assert_eq!(endpoint.password().expose(), "eyJ.jwt.sig");
	assert_eq!(prompter.asked(), ["Choose an OAuth 2.0 resource server:"]);

	let opened = browser.opened();
	let consent = opened[0].query_pairs().into_owned().collect::<HashMap<_, _>>();

	assert_eq!(opened.len(), 1);
	assert!(opened[0].as_str().starts_with(&server.url("/realms/prod/auth")));
	assert_eq!(consent["client_id"], CLIENT_ID);
	assert_eq!(consent["audience"], "rabbit_prod");
	assert_eq!(consent["resource"], "rabbit_prod");
	assert_eq!(consent["scope"], "openid rabbitmq.read:*/*");
	assert_eq!(consent["code_challenge_method"], "S256");
}

#[tokio::test]
async fn provider_error_on_the_redirect_aborts_the_login() {
	let server = MockServer::start_async().await;

	mock_discovery(&server).await;

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/realms/prod/token");
			then.status(500);
		})
		.await;
	let browser = Arc::new(consenting_browser(&[
		("error", "access_denied"),
		("error_description", "User denied consent"),
	]));
	let negotiator = AuthNegotiator::new(
		test_reqwest_http_client(),
		Arc::new(ScriptedPrompter::default().pick(0)),
		browser,
	);
	let err = negotiator
		.negotiate(&config(&server, free_redirect_url()), &CancellationToken::new())
		.await
		.expect_err("Provider error should abort the login.");

	token.assert_calls_async(0).await;

	assert!(matches!(
		err,
		Error::Callback(CallbackError::Provider { ref error, .. }) if error == "access_denied"
	));
}

#[tokio::test]
async fn choosing_none_quits_before_the_browser_opens() {
	let server = MockServer::start_async().await;

	mock_discovery(&server).await;

	let browser = Arc::new(RecordingBrowser::default());
	let negotiator = AuthNegotiator::new(
		test_reqwest_http_client(),
		Arc::new(ScriptedPrompter::default().pick(1)),
		browser.clone(),
	);
	let err = negotiator
		.negotiate(&config(&server, free_redirect_url()), &CancellationToken::new())
		.await
		.expect_err("Choosing `none` should abort.");

	assert!(matches!(err, Error::Discovery(DiscoveryError::NoResourceServerChosen)));
	assert!(browser.opened().is_empty());
}

#[tokio::test]
async fn shutdown_while_waiting_for_consent_cancels() {
	let server = MockServer::start_async().await;

	mock_discovery(&server).await;

	let shutdown = CancellationToken::new();
	let browser = RecordingBrowser::default().on_open({
		let shutdown = shutdown.clone();

		move |_| shutdown.cancel()
	});
	let negotiator = AuthNegotiator::new(
		test_reqwest_http_client(),
		Arc::new(ScriptedPrompter::default().pick(0)),
		Arc::new(browser),
	);
	let err = negotiator
		.negotiate(&config(&server, free_redirect_url()), &shutdown)
		.await
		.expect_err("Shutdown should cancel the login.");

	assert!(matches!(err, Error::Cancelled));
}
