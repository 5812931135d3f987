//! Single-use Authorization Code + PKCE session.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Parameters of one consent request.
#[derive(Clone, Debug)]
pub struct ConsentRequest<'a> {
	/// Public client identifier.
	pub client_id: &'a str,
	/// Redirect URL served by the callback listener.
	pub redirect_url: &'a Url,
	/// Scopes to request.
	pub scopes: Vec<&'a str>,
	/// Chosen resource server, sent as both `audience` and `resource`.
	pub resource_server: &'a str,
}

/// Authorization Code + PKCE handshake state for one attempt.
///
/// The session is moved into the callback listener once the consent URL has been built and is
/// only read from then on.
pub struct PkceSession {
	state: String,
	pkce: PkcePair,
	redirect_url: Url,
	consent_url: Url,
	created_at: OffsetDateTime,
}
impl PkceSession {
	/// Generates fresh `state` and PKCE values and builds the consent URL on top of
	/// `authorization_endpoint`.
	pub fn start(authorization_endpoint: &Url, request: &ConsentRequest) -> Self {
		let state = random_string(STATE_LEN);
		let pkce = PkcePair::generate();
		let consent_url = build_consent_url(authorization_endpoint, request, &state, &pkce);

		Self {
			state,
			pkce,
			redirect_url: request.redirect_url.clone(),
			consent_url,
			created_at: OffsetDateTime::now_utc(),
		}
	}

	/// Opaque anti-forgery value that must round-trip via the redirect.
	pub fn state(&self) -> &str {
		&self.state
	}

	/// URL the operator must visit to grant consent.
	pub fn consent_url(&self) -> &Url {
		&self.consent_url
	}

	/// Redirect URL announced in the consent request.
	pub fn redirect_url(&self) -> &Url {
		&self.redirect_url
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// Time elapsed since the consent URL was built.
	pub fn age(&self) -> time::Duration {
		OffsetDateTime::now_utc() - self.created_at
	}

	/// Returns true if `returned` equals the session's state.
	pub fn matches_state(&self, returned: Option<&str>) -> bool {
		returned.is_some_and(|value| value == self.state)
	}

	pub(crate) fn verifier(&self) -> &str {
		&self.pkce.verifier
	}
}
impl Debug for PkceSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkceSession")
			.field("state", &self.state)
			.field("redirect_url", &self.redirect_url)
			.field("consent_url", &self.consent_url)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.field("created_at", &self.created_at)
			.finish()
	}
}

struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

fn build_consent_url(
	authorization_endpoint: &Url,
	request: &ConsentRequest,
	state: &str,
	pkce: &PkcePair,
) -> Url {
	let mut url = authorization_endpoint.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", request.client_id);
	pairs.append_pair("redirect_uri", request.redirect_url.as_str());

	if !request.scopes.is_empty() {
		pairs.append_pair("scope", &request.scopes.join(" "));
	}

	pairs.append_pair("state", state);
	pairs.append_pair("code_challenge", &pkce.challenge);
	pairs.append_pair("code_challenge_method", pkce.method.as_str());
	pairs.append_pair("audience", request.resource_server);
	pairs.append_pair("resource", request.resource_server);
	pairs.append_pair("response_mode", "query");

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn session() -> PkceSession {
		let endpoint = Url::parse("https://idp.example.com/realms/r/auth?kc_idp_hint=corp")
			.expect("Authorization endpoint fixture should parse.");
		let redirect = Url::parse("http://localhost:8080/callback")
			.expect("Redirect URL fixture should parse.");

		PkceSession::start(
			&endpoint,
			&ConsentRequest {
				client_id: "coyote-cli",
				redirect_url: &redirect,
				scopes: vec!["openid", "rabbitmq.read:*/*"],
				resource_server: "rabbit_prod",
			},
		)
	}

	#[test]
	fn consent_url_embeds_endpoint_and_parameters() {
		let session = session();
		let url = session.consent_url();
		let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();

		assert!(url.as_str().starts_with("https://idp.example.com/realms/r/auth?kc_idp_hint=corp&"));
		assert_eq!(pairs.get("response_type"), Some(&"code".into()));
		assert_eq!(pairs.get("client_id"), Some(&"coyote-cli".into()));
		assert_eq!(pairs.get("redirect_uri"), Some(&"http://localhost:8080/callback".into()));
		assert_eq!(pairs.get("scope"), Some(&"openid rabbitmq.read:*/*".into()));
		assert_eq!(pairs.get("audience"), Some(&"rabbit_prod".into()));
		assert_eq!(pairs.get("resource"), Some(&"rabbit_prod".into()));
		assert_eq!(pairs.get("response_mode"), Some(&"query".into()));
		assert_eq!(pairs.get("state"), Some(&session.state().to_owned()));
		assert_eq!(pairs.get("code_challenge"), Some(&session.code_challenge().to_owned()));
		assert_eq!(pairs.get("code_challenge_method"), Some(&"S256".into()));
	}

	#[test]
	fn challenge_is_s256_of_verifier() {
		let session = session();

		assert_eq!(session.verifier().len(), PKCE_VERIFIER_LEN);
		assert_eq!(session.code_challenge(), compute_pkce_challenge(session.verifier()));
		assert_eq!(
			compute_pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}

	#[test]
	fn age_counts_from_session_start() {
		let age = session().age();

		assert!(!age.is_negative());
		assert!(age < time::Duration::seconds(5));
	}

	#[test]
	fn state_is_fresh_and_checked_exactly() {
		let first = session();
		let second = session();

		assert_eq!(first.state().len(), STATE_LEN);
		assert!(first.state().chars().all(|c| c.is_ascii_alphanumeric()));
		assert_ne!(first.state(), second.state());
		assert!(first.matches_state(Some(first.state())));
		assert!(!first.matches_state(Some(second.state())));
		assert!(!first.matches_state(None));
	}
}
