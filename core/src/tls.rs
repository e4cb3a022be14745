//! TLS layer built on rustls.
//!
//! Trust comes from the configured CA file and/or CA directory when either is
//! set, otherwise from the bundled Mozilla roots. Verification can only be
//! switched off through `RequestConfig::insecure_skip_verify`.

use std::fs;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme,
    StreamOwned,
};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tracing::{debug, warn};

use crate::config::RequestConfig;
use crate::error::{AgentError, ConnectError};

pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Accepts every certificate and host name while still checking handshake
/// signatures.
#[derive(Debug)]
struct NoVerification(CryptoProvider);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the rustls client configuration for this session.
pub fn client_config(config: &RequestConfig) -> Result<Arc<ClientConfig>, AgentError> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectError::tls(e.to_string()))?;

    let tls_config = if config.insecure_skip_verify {
        warn!("TLS certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider.as_ref().clone())))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(root_store(config)?)
            .with_no_client_auth()
    };
    Ok(Arc::new(tls_config))
}

fn root_store(config: &RequestConfig) -> Result<RootCertStore, AgentError> {
    let mut roots = RootCertStore::empty();
    if config.ca_file.is_none() && config.ca_path.is_none() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(roots);
    }

    if let Some(file) = &config.ca_file {
        add_pem_file(&mut roots, file)?;
    }
    if let Some(dir) = &config.ca_path {
        let entries = fs::read_dir(dir)
            .map_err(|e| AgentError::Config(format!("CA path {}: {e}", dir.display())))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                // Directories commonly hold non-certificate files too.
                if let Err(err) = add_pem_file(&mut roots, &path) {
                    debug!(path = %path.display(), error = %err, "skipping CA entry");
                }
            }
        }
    }
    if roots.is_empty() {
        return Err(AgentError::Config("no usable CA certificates found".to_string()));
    }
    Ok(roots)
}

fn add_pem_file(roots: &mut RootCertStore, path: &Path) -> Result<(), AgentError> {
    let certs = CertificateDer::pem_file_iter(path).map_err(|e| ca_error(path, e))?;
    for cert in certs {
        roots
            .add(cert.map_err(|e| ca_error(path, e))?)
            .map_err(|e| ca_error(path, e))?;
    }
    Ok(())
}

fn ca_error(path: &Path, err: impl std::fmt::Display) -> AgentError {
    AgentError::Config(format!("CA file {}: {err}", path.display()))
}

/// Run the TLS handshake over an established TCP stream.
pub fn handshake(
    mut tcp: TcpStream,
    server_name: &str,
    config: &RequestConfig,
) -> Result<TlsStream, AgentError> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|_| ConnectError::tls(format!("invalid server name {server_name}")))?;
    let mut conn = ClientConnection::new(client_config(config)?, name)
        .map_err(|e| ConnectError::tls(e.to_string()))?;

    while conn.is_handshaking() {
        conn.complete_io(&mut tcp)
            .map_err(|e| ConnectError::tls(e.to_string()))?;
    }
    debug!(
        server_name,
        version = ?conn.protocol_version(),
        "TLS handshake complete"
    );
    Ok(StreamOwned::new(conn, tcp))
}
