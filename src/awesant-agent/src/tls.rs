// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! TLS material loading for the lumberjack transport.
//!
//! Client configs trust either a configured CA bundle or the system roots;
//! server configs require certificate + key and verify client certificates
//! whenever a CA bundle is configured.

use std::path::Path;
use std::sync::{Arc, Once};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use awesant_core::DynResult;

static INIT_CRYPTO: Once = Once::new();

/// Install the ring CryptoProvider once per process. Safe to call from
/// every transport constructor.
pub fn install_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn load_certs(path: &Path) -> DynResult<Vec<CertificateDer<'static>>> {
    let data = std::fs::read(path)
        .map_err(|e| format!("read certificate file {}: {}", path.display(), e))?;
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut data.as_slice()).collect();
    let certs = certs.map_err(|e| format!("parse certificates in {}: {}", path.display(), e))?;
    if certs.is_empty() {
        return Err(format!("no certificates found in {}", path.display()).into());
    }
    Ok(certs)
}

fn load_key(path: &Path) -> DynResult<PrivateKeyDer<'static>> {
    let data =
        std::fs::read(path).map_err(|e| format!("read key file {}: {}", path.display(), e))?;
    rustls_pemfile::private_key(&mut data.as_slice())
        .map_err(|e| format!("parse key in {}: {}", path.display(), e))?
        .ok_or_else(|| format!("no private key found in {}", path.display()).into())
}

fn root_store(ca_file: Option<&Path>) -> DynResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match ca_file {
        Some(path) => {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|e| format!("add CA from {}: {}", path.display(), e))?;
            }
        }
        None => {
            for cert in rustls_native_certs::load_native_certs()
                .map_err(|e| format!("load system root certificates: {}", e))?
            {
                let _ = roots.add(cert);
            }
        }
    }
    Ok(roots)
}

/// TLS client config for the lumberjack output.
pub fn client_config(
    ca_file: Option<&Path>,
    cert_file: Option<&Path>,
    key_file: Option<&Path>,
) -> DynResult<Arc<ClientConfig>> {
    install_crypto_provider();
    let roots = root_store(ca_file)?;
    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match (cert_file, key_file) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(|e| format!("client certificate: {}", e))?,
        _ => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

/// TLS server config for the lumberjack input. A configured CA bundle
/// turns on client-certificate verification.
pub fn server_config(
    cert_file: &Path,
    key_file: &Path,
    ca_file: Option<&Path>,
) -> DynResult<Arc<ServerConfig>> {
    install_crypto_provider();
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;

    let builder = match ca_file {
        Some(path) => {
            let roots = Arc::new(root_store(Some(path))?);
            let verifier = WebPkiClientVerifier::builder(roots)
                .build()
                .map_err(|e| format!("client verifier from {}: {}", path.display(), e))?;
            ServerConfig::builder().with_client_cert_verifier(verifier)
        }
        None => ServerConfig::builder().with_no_client_auth(),
    };

    let config = builder
        .with_single_cert(certs, key)
        .map_err(|e| format!("server certificate: {}", e))?;
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cert_file_is_a_readable_error() {
        let err = load_certs(Path::new("/nonexistent/server.crt")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/server.crt"));
    }

    #[test]
    fn empty_pem_is_rejected() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let err = load_certs(f.path()).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn install_crypto_provider_is_idempotent() {
        install_crypto_provider();
        install_crypto_provider();
    }
}
