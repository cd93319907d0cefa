// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;

use tonic::transport::ClientTlsConfig;

static TLS_CONFIG: Lazy<ClientTlsConfig> = Lazy::new(|| {
    // Another component of the process may already have installed a provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    ClientTlsConfig::new()
        .with_native_roots()
        .assume_http2(true)
});

pub fn config() -> &'static ClientTlsConfig {
    &TLS_CONFIG
}
