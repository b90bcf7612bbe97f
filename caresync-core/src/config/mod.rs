use std::net::{IpAddr, Ipv4Addr};

use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Listener settings shared by every CareSync service. Service-specific
/// settings layer on top of this via `#[serde(flatten)]`.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface the listener binds to. Defaults to all interfaces;
    /// sidecar-only deployments override this to loopback.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
}

fn default_port() -> u16 {
    8080
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("caresync").required(false))
            .add_source(config::Environment::with_prefix("CARESYNC").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
