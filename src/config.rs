//! Server configuration.
//!
//! Every option can be given as a command-line flag or through an
//! `LRUKV_*` environment variable. Flags win over the environment.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors found while validating a [`Config`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--enable-tls requires both --tls-cert and --tls-key")]
    MissingTlsFiles,

    #[error("--report-interval-secs must be greater than zero")]
    ZeroReportInterval,
}

/// lrukv - an in-memory key-value server with LRU eviction
#[derive(Parser, Debug, Clone)]
#[command(name = "lrukv", version, about)]
pub struct Config {
    /// Maximum total size of stored values, in bytes
    #[arg(long, env = "LRUKV_CAPACITY_BYTES", default_value_t = crate::DEFAULT_CAPACITY)]
    pub capacity_bytes: usize,

    /// Plain TCP listen address
    #[arg(long, env = "LRUKV_TCP_LISTEN", default_value = crate::DEFAULT_TCP_LISTEN)]
    pub tcp_listen: String,

    /// Also accept TLS connections (requires --tls-cert and --tls-key)
    #[arg(long, env = "LRUKV_ENABLE_TLS")]
    pub enable_tls: bool,

    /// TLS listen address
    #[arg(long, env = "LRUKV_TLS_LISTEN", default_value = crate::DEFAULT_TLS_LISTEN)]
    pub tls_listen: String,

    /// PEM certificate chain
    #[arg(long, env = "LRUKV_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, env = "LRUKV_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Seconds between capacity reports
    #[arg(long, env = "LRUKV_REPORT_INTERVAL_SECS", default_value_t = 10)]
    pub report_interval_secs: u64,
}

impl Config {
    /// Checks option combinations clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_tls && (self.tls_cert.is_none() || self.tls_key.is_none()) {
            return Err(ConfigError::MissingTlsFiles);
        }
        if self.report_interval_secs == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        Ok(())
    }

    /// The certificate and key paths, when TLS is enabled.
    pub fn tls_files(&self) -> Option<(&PathBuf, &PathBuf)> {
        if !self.enable_tls {
            return None;
        }
        self.tls_cert.as_ref().zip(self.tls_key.as_ref())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}
