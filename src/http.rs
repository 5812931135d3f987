//! HTTP transport shared by OAuth 2.0 discovery and the token exchange.
//!
//! [`ReqwestHttpClient`] wraps two [`ReqwestClient`]s whose TLS policy follows the sink's
//! `insecure` flag: one for token requests that never follows redirects, and one for discovery
//! documents that does. The `oauth2` crate talks to it through [`InstrumentedHandle`], which records
//! the HTTP status of the last response in a [`ResponseMetadataSlot`] so token-endpoint
//! failures can be reported with the status the provider answered.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::redirect::Policy;
// self
use crate::{_prelude::*, error::ConfigError};

/// Captures metadata from the most recent HTTP response for error reporting.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Dereferences to the token client, which never follows redirects: token endpoints must
/// answer directly. [`ReqwestHttpClient::discovery`] follows a bounded number of redirects so
/// management APIs and providers behind a trailing-slash or proxy redirect still resolve.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	discovery: ReqwestClient,
}
impl ReqwestHttpClient {
	/// Redirect hops a discovery request may follow.
	pub const MAX_DISCOVERY_REDIRECTS: usize = 5;

	/// Builds the clients; `insecure` disables certificate and hostname verification.
	pub fn new(insecure: bool) -> Result<Self, ConfigError> {
		let client = Self::builder(insecure).redirect(Policy::none()).build()?;
		let discovery =
			Self::builder(insecure).redirect(Policy::limited(Self::MAX_DISCOVERY_REDIRECTS)).build()?;

		Ok(Self { client, discovery })
	}

	/// Client for discovery documents.
	pub fn discovery(&self) -> &ReqwestClient {
		&self.discovery
	}

	/// Builds an `oauth2` transport handle that records response metadata in `slot`.
	pub fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle { client: self.client.clone(), slot }
	}

	fn builder(insecure: bool) -> reqwest::ClientBuilder {
		ReqwestClient::builder()
			.danger_accept_invalid_certs(insecure)
			.danger_accept_invalid_hostnames(insecure)
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}

/// [`AsyncHttpClient`] adapter for reqwest that records the response status.
#[derive(Clone, Debug)]
pub struct InstrumentedHandle {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let response = self
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			self.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
