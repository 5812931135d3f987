//! rustls settings for `--insecure` AMQPS dials.

// crates.io
use lapin::tcp::RustlsConnector;
use rustls::{
	ClientConfig, DigitallySignedStruct, Error as TlsError, SignatureScheme,
	client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
	crypto::{self, WebPkiSupportedAlgorithms},
	pki_types::{CertificateDer, ServerName, UnixTime},
};
// self
use crate::{_prelude::*, error::ConfigError};

/// Builds a connector that accepts any broker certificate and host name.
///
/// Handshake signatures are still checked against the presented certificate.
pub fn unverified_connector() -> Result<RustlsConnector, ConfigError> {
	let provider = Arc::new(crypto::ring::default_provider());
	let verifier = AcceptAnyCertificate(provider.signature_verification_algorithms);
	let config = ClientConfig::builder_with_provider(provider)
		.with_safe_default_protocol_versions()
		.map_err(|source| ConfigError::TlsBuild { source })?
		.dangerous()
		.with_custom_certificate_verifier(Arc::new(verifier))
		.with_no_client_auth();

	Ok(RustlsConnector::from(config))
}

#[derive(Debug)]
struct AcceptAnyCertificate(WebPkiSupportedAlgorithms);
impl ServerCertVerifier for AcceptAnyCertificate {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> Result<ServerCertVerified, TlsError> {
		Ok(ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, TlsError> {
		crypto::verify_tls12_signature(message, cert, dss, &self.0)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, TlsError> {
		crypto::verify_tls13_signature(message, cert, dss, &self.0)
	}

	fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
		self.0.supported_schemes()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn accepts_any_server_certificate() {
		let verifier =
			AcceptAnyCertificate(crypto::ring::default_provider().signature_verification_algorithms);
		let name = ServerName::try_from("broker.invalid").expect("Server name fixture should parse.");
		let verdict = verifier.verify_server_cert(
			&CertificateDer::from(vec![0_u8; 4]),
			&[],
			&name,
			&[],
			UnixTime::now(),
		);

		assert!(verdict.is_ok());
		assert!(!verifier.supported_verify_schemes().is_empty());
	}
}
