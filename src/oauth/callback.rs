//! Ephemeral HTTP listener that captures exactly one authorization redirect.

// std
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
// crates.io
use axum::{
	Router,
	extract::{Query, State},
	http::StatusCode,
	response::{Html, IntoResponse, Response},
	routing::get,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use url::Host;
// self
use crate::{
	_prelude::*,
	error::{CallbackError, ConfigError},
	oauth::{PkceSession, Token, TokenExchanger},
};

const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(2);
const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
	<title>Authentication Successful</title>
	<style>
		body { font-family: Arial, sans-serif; text-align: center; padding: 50px; }
		h1 { color: #4CAF50; }
		p { font-size: 18px; }
	</style>
</head>
<body>
	<h1>Authentication Successful</h1>
	<p>You can close this window and return to the terminal.</p>
</body>
</html>
"#;

type Outcome = Result<Token, CallbackError>;

/// Redirect query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Anti-forgery state.
	pub state: Option<String>,
	/// OAuth error code.
	pub error: Option<String>,
	/// OAuth error description.
	pub error_description: Option<String>,
}

struct CallbackContext {
	session: PkceSession,
	exchanger: TokenExchanger,
	pending: Mutex<Option<oneshot::Sender<Outcome>>>,
}
impl CallbackContext {
	async fn redeem(&self, params: CallbackParams) -> Outcome {
		if !self.session.matches_state(params.state.as_deref()) {
			return Err(CallbackError::StateMismatch);
		}
		if let Some(error) = params.error.filter(|error| !error.is_empty()) {
			return Err(CallbackError::Provider {
				error,
				description: params.error_description.unwrap_or_default(),
			});
		}

		let code = params.code.filter(|code| !code.is_empty()).ok_or(CallbackError::MissingCode)?;

		self.exchanger.exchange(&code, self.session.verifier()).await
	}
}

/// Listener serving the redirect URL's path for one authorization attempt.
///
/// The first request on that path claims the attempt: its outcome, success or rejection, is
/// published once and later requests are answered with `409 Conflict`. The listener is torn
/// down when [`CallbackListener::wait`] returns, whatever the outcome.
pub struct CallbackListener {
	local_addr: SocketAddr,
	path: String,
	outcome: oneshot::Receiver<Outcome>,
	server: JoinHandle<()>,
	stop: CancellationToken,
}
impl CallbackListener {
	/// Binds the redirect URL's address and starts serving.
	pub async fn bind(session: PkceSession, exchanger: TokenExchanger) -> Result<Self> {
		let addr = listen_addr(session.redirect_url())?;
		let path = session.redirect_url().path().to_owned();
		let listener = TcpListener::bind(addr)
			.await
			.map_err(|source| ConfigError::CallbackBind { addr: addr.to_string(), source })?;
		let local_addr = listener
			.local_addr()
			.map_err(|source| ConfigError::CallbackBind { addr: addr.to_string(), source })?;
		let (reply, outcome) = oneshot::channel();
		let context = Arc::new(CallbackContext { session, exchanger, pending: Mutex::new(Some(reply)) });
		let app = Router::new().route(&path, get(handle_callback)).with_state(context);
		let stop = CancellationToken::new();
		let server = tokio::spawn({
			let stop = stop.clone();

			async move {
				if let Err(e) =
					axum::serve(listener, app).with_graceful_shutdown(stop.cancelled_owned()).await
				{
					tracing::warn!(error = %e, "Callback listener stopped with an error.");
				}
			}
		});

		tracing::debug!(%local_addr, %path, "Callback listener started.");

		Ok(Self { local_addr, path, outcome, server, stop })
	}

	/// Address the listener is bound to.
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Waits for the outcome, a timeout, or shutdown, then tears the listener down.
	pub async fn wait(self, timeout: Duration, shutdown: &CancellationToken) -> Result<Token> {
		let Self { outcome, server, stop, .. } = self;
		let (result, graceful) = tokio::select! {
			biased;
			_ = shutdown.cancelled() => (Err(Error::Cancelled), false),
			received = outcome => {
				let result = match received {
					Ok(outcome) => outcome.map_err(Error::from),
					Err(_) => Err(CallbackError::ListenerClosed.into()),
				};

				(result, true)
			},
			_ = tokio::time::sleep(timeout) => (Err(Error::CallbackTimeout { timeout }), false),
		};

		teardown(server, stop, graceful).await;

		result
	}
}
impl Debug for CallbackListener {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CallbackListener")
			.field("local_addr", &self.local_addr)
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}

async fn handle_callback(
	State(context): State<Arc<CallbackContext>>,
	Query(params): Query<CallbackParams>,
) -> Response {
	let reply = context.pending.lock().take();
	let Some(reply) = reply else {
		return (StatusCode::CONFLICT, "Authorization callback already handled.").into_response();
	};

	match context.redeem(params).await {
		Ok(token) => {
			tracing::info!(
				consent_secs = context.session.age().whole_seconds(),
				"Authorization callback accepted."
			);

			let _ = reply.send(Ok(token));

			Html(SUCCESS_PAGE).into_response()
		},
		Err(err) => {
			let status = rejection_status(&err);
			let body = err.to_string();

			tracing::warn!(%status, error = %body, "Authorization callback rejected.");

			let _ = reply.send(Err(err));

			(status, body).into_response()
		},
	}
}

fn rejection_status(err: &CallbackError) -> StatusCode {
	match err {
		CallbackError::StateMismatch
		| CallbackError::Provider { .. }
		| CallbackError::MissingCode => StatusCode::BAD_REQUEST,
		CallbackError::Exchange { .. } | CallbackError::ListenerClosed =>
			StatusCode::INTERNAL_SERVER_ERROR,
	}
}

// A completed attempt drains in-flight responses; timeouts and shutdown abort immediately.
async fn teardown(mut server: JoinHandle<()>, stop: CancellationToken, graceful: bool) {
	stop.cancel();

	if graceful && tokio::time::timeout(GRACEFUL_SHUTDOWN, &mut server).await.is_ok() {
		return;
	}

	server.abort();

	let _ = server.await;

	tracing::debug!("Callback listener torn down.");
}

fn listen_addr(redirect: &Url) -> Result<SocketAddr, ConfigError> {
	let invalid = |reason| ConfigError::InvalidRedirectUrl { url: redirect.to_string(), reason };

	if redirect.scheme() != "http" {
		return Err(invalid("only http:// redirect URLs can be served locally"));
	}
	// The router reads these as captures and panics on them.
	if redirect.path_segments().into_iter().flatten().any(|segment| segment.starts_with([':', '*']))
	{
		return Err(invalid("path segments cannot start with `:` or `*`"));
	}

	let ip = match redirect.host() {
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
		Some(Host::Domain(_)) => IpAddr::V4(Ipv4Addr::LOCALHOST),
		None => return Err(invalid("a host is required")),
	};
	let port = redirect.port_or_known_default().ok_or_else(|| invalid("a port is required"))?;

	Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::test_reqwest_http_client,
		oauth::{ConsentRequest, OpenIdMetadata},
	};

	fn metadata() -> OpenIdMetadata {
		OpenIdMetadata {
			authorization_endpoint: Url::parse("http://127.0.0.1:9/authorize")
				.expect("Failed to parse authorization endpoint URL."),
			token_endpoint: Url::parse("http://127.0.0.1:9/token")
				.expect("Failed to parse token endpoint URL."),
		}
	}

	async fn start_listener() -> (CallbackListener, String, Url) {
		let redirect =
			Url::parse("http://127.0.0.1:0/callback").expect("Failed to parse redirect URI.");
		let session = PkceSession::start(
			&metadata().authorization_endpoint,
			&ConsentRequest {
				client_id: "coyote-cli",
				redirect_url: &redirect,
				scopes: Vec::new(),
				resource_server: "rabbit",
			},
		);
		let state = session.state().to_owned();
		let exchanger =
			TokenExchanger::new(&metadata(), "coyote-cli", &redirect, test_reqwest_http_client())
				.expect("Token exchanger should build.");
		let listener = CallbackListener::bind(session, exchanger)
			.await
			.expect("Callback listener should bind an ephemeral port.");
		let url = Url::parse(&format!("http://{}/callback", listener.local_addr()))
			.expect("Callback URL should parse.");

		(listener, state, url)
	}

	#[test]
	fn listen_addr_requires_plain_http() {
		let https = Url::parse("https://localhost:8443/cb").expect("Failed to parse redirect URI.");
		let named = Url::parse("http://localhost/cb").expect("Failed to parse redirect URI.");

		assert!(matches!(listen_addr(&https), Err(ConfigError::InvalidRedirectUrl { .. })));
		assert_eq!(
			listen_addr(&named).expect("Named host should map to loopback."),
			SocketAddr::from(([127, 0, 0, 1], 80))
		);
	}

	#[test]
	fn listen_addr_rejects_route_capture_segments() {
		for redirect in ["http://127.0.0.1:8080/cb/:id", "http://127.0.0.1:8080/*rest"] {
			let redirect = Url::parse(redirect).expect("Failed to parse redirect URI.");
			let err = listen_addr(&redirect).expect_err("Capture-like segment should be rejected.");

			assert!(matches!(
				err,
				ConfigError::InvalidRedirectUrl {
					reason: "path segments cannot start with `:` or `*`",
					..
				}
			));
		}

		let literal = Url::parse("http://127.0.0.1:8080/cb/v1:ok").expect("Failed to parse URI.");

		assert!(listen_addr(&literal).is_ok());
	}

	#[tokio::test]
	async fn state_mismatch_is_rejected_without_a_token() {
		let (listener, _state, mut url) = start_listener().await;

		url.query_pairs_mut().append_pair("state", "forged").append_pair("code", "abc");

		let waiter = tokio::spawn(async move {
			listener.wait(Duration::from_secs(5), &CancellationToken::new()).await
		});
		let response = reqwest::get(url).await.expect("Callback request should complete.");

		assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
		assert_eq!(
			response.text().await.expect("Rejection body should be readable."),
			"State parameter doesn't match."
		);

		let err = waiter
			.await
			.expect("Waiter task should not panic.")
			.expect_err("Forged state should abort the attempt.");

		assert!(matches!(err, Error::Callback(CallbackError::StateMismatch)));
	}

	#[tokio::test]
	async fn provider_error_and_missing_code_are_rejected() {
		let (listener, state, mut url) = start_listener().await;

		url.query_pairs_mut()
			.append_pair("state", &state)
			.append_pair("error", "access_denied")
			.append_pair("error_description", "User declined");

		let response = reqwest::get(url).await.expect("Callback request should complete.");

		assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
		assert!(
			response
				.text()
				.await
				.expect("Rejection body should be readable.")
				.contains("access_denied - User declined")
		);

		let err = listener
			.wait(Duration::from_secs(5), &CancellationToken::new())
			.await
			.expect_err("Provider error should abort the attempt.");

		assert!(matches!(err, Error::Callback(CallbackError::Provider { .. })));

		let (listener, state, mut url) = start_listener().await;

		url.query_pairs_mut().append_pair("state", &state);

		let response = reqwest::get(url).await.expect("Callback request should complete.");

		assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

		let err = listener
			.wait(Duration::from_secs(5), &CancellationToken::new())
			.await
			.expect_err("Missing code should abort the attempt.");

		assert!(matches!(err, Error::Callback(CallbackError::MissingCode)));
	}

	#[tokio::test]
	async fn silence_times_out_and_releases_the_socket() {
		let (listener, _state, url) = start_listener().await;
		let err = listener
			.wait(Duration::from_millis(50), &CancellationToken::new())
			.await
			.expect_err("Silent provider should time out.");

		assert!(matches!(err, Error::CallbackTimeout { .. }));
		assert!(reqwest::get(url).await.is_err());
	}

	#[tokio::test]
	async fn shutdown_cancels_the_wait() {
		let (listener, _state, url) = start_listener().await;
		let shutdown = CancellationToken::new();

		shutdown.cancel();

		let err = listener
			.wait(Duration::from_secs(60), &shutdown)
			.await
			.expect_err("Shutdown should cancel the wait.");

		assert!(matches!(err, Error::Cancelled));
		assert!(reqwest::get(url).await.is_err());
	}
}
