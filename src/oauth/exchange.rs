//! Authorization code for access token exchange.

// crates.io
use oauth2::{
	AuthUrl, AuthorizationCode, ClientId, EndpointNotSet, EndpointSet, HttpClientError,
	PkceCodeVerifier, RedirectUrl, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	error::{CallbackError, ConfigError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::OpenIdMetadata,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Access token issued by the provider.
#[derive(Clone, Debug)]
pub struct Token {
	/// Bearer credential presented to the broker as the password.
	pub access_token: Secret,
	/// Token type reported by the provider.
	pub token_type: String,
}

/// Public-client token exchanger bound to one provider and redirect URL.
#[derive(Clone, Debug)]
pub struct TokenExchanger {
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
}
impl TokenExchanger {
	/// Configures the exchanger from discovered provider metadata.
	pub fn new(
		metadata: &OpenIdMetadata,
		client_id: &str,
		redirect_url: &Url,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::new(metadata.authorization_endpoint.to_string()).map_err(
			|source| ConfigError::InvalidEndpoint { endpoint: "authorization", source },
		)?;
		let token_url = TokenUrl::new(metadata.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let redirect_url = RedirectUrl::new(redirect_url.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "redirect", source })?;
		let oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		Ok(Self { oauth_client, http_client })
	}

	/// Redeems `code` with the PKCE `verifier` that produced the consent URL's challenge.
	pub async fn exchange(&self, code: &str, verifier: &str) -> Result<Token, CallbackError> {
		obs::record_flow_outcome(FlowKind::Exchange, FlowOutcome::Attempt);

		let result =
			FlowSpan::new(FlowKind::Exchange, "exchange").instrument(self.redeem(code, verifier)).await;
		let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

		obs::record_flow_outcome(FlowKind::Exchange, outcome);

		result
	}

	async fn redeem(&self, code: &str, verifier: &str) -> Result<Token, CallbackError> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()))
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;

		Ok(Token {
			access_token: Secret::new(response.access_token().secret().to_owned()),
			token_type: response.token_type().as_ref().to_owned(),
		})
	}
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> CallbackError {
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => {
			let message = match response.error_description() {
				Some(description) =>
					format!("provider returned `{}`: {description}", response.error().as_ref()),
				None => format!("provider returned `{}`", response.error().as_ref()),
			};

			CallbackError::Exchange { message, status, source: None }
		},
		RequestTokenError::Request(error) => CallbackError::Exchange {
			message: "token endpoint could not be reached".into(),
			status,
			source: Some(Box::new(error)),
		},
		RequestTokenError::Parse(error, _body) => CallbackError::Exchange {
			message: "token endpoint returned malformed JSON".into(),
			status,
			source: Some(Box::new(error)),
		},
		RequestTokenError::Other(message) => CallbackError::Exchange { message, status, source: None },
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;

	fn metadata(server: &MockServer) -> OpenIdMetadata {
		OpenIdMetadata {
			authorization_endpoint: Url::parse(&server.url("/authorize"))
				.expect("Failed to parse authorization endpoint URL."),
			token_endpoint: Url::parse(&server.url("/token"))
				.expect("Failed to parse token endpoint URL."),
		}
	}

	#[tokio::test]
	async fn provider_rejection_keeps_status_and_description() {
		let server = MockServer::start_async().await;
		let token = server
			.mock_async(|when, then| {
				when.method(POST).path("/token").body_includes("code_verifier=v3rifier");
				then.status(400).header("content-type", "application/json").body(
					r#"{"error":"invalid_grant","error_description":"Code not valid"}"#,
				);
			})
			.await;
		let redirect =
			Url::parse("http://127.0.0.1:8080/callback").expect("Failed to parse redirect URI.");
		let exchanger = TokenExchanger::new(
			&metadata(&server),
			"coyote-cli",
			&redirect,
			ReqwestHttpClient::new(false).expect("HTTP client should build."),
		)
		.expect("Exchanger should build.");
		let err = exchanger
			.exchange("stale-code", "v3rifier")
			.await
			.expect_err("Rejected code should fail the exchange.");

		token.assert_async().await;

		let CallbackError::Exchange { message, status, .. } = err else {
			panic!("Expected an exchange failure, got {err:?}.");
		};

		assert_eq!(status, Some(400));
		assert_eq!(message, "provider returned `invalid_grant`: Code not valid");
	}

	#[test]
	fn builds_public_client_from_metadata() {
		let metadata = OpenIdMetadata {
			authorization_endpoint: Url::parse("https://idp.example.com/authorize")
				.expect("Failed to parse authorization endpoint URL."),
			token_endpoint: Url::parse("https://idp.example.com/token")
				.expect("Failed to parse token endpoint URL."),
		};
		let redirect =
			Url::parse("http://localhost:8080/callback").expect("Failed to parse redirect URI.");
		let result = TokenExchanger::new(
			&metadata,
			"coyote-cli",
			&redirect,
			ReqwestHttpClient::new(false).expect("HTTP client should build."),
		);

		assert!(result.is_ok());
	}
}
