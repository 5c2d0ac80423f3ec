//! YAML configuration for the balancer.
//!
//! The file shape mirrors the deployment charts: an optional `info`
//! block and a mandatory `configuration` block naming the backend
//! transport family, the AMF service DNS names, the local NGAP bind
//! addresses and the two ports.

#[cfg(test)]
mod config_test;

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// NGAP's well-known SCTP port, used when `ngappPort` is absent.
pub const DEFAULT_NGAP_PORT: u16 = 38412;

#[derive(Debug, Clone)]
pub struct Config {
    pub info: Option<Info>,
    pub configuration: Configuration,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    info: Option<Info>,
    #[serde(default)]
    configuration: Option<Configuration>,
}

/// Deployment metadata, unused by the core.
#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Backend transport family; `grpc` is the only supported value.
    #[serde(rename = "type", default)]
    pub backend_type: String,

    /// DNS names whose A records are the AMF instances to pool.
    #[serde(default)]
    pub services: Vec<Service>,

    /// Local addresses the NGAP listener binds.
    #[serde(rename = "ngapIpList", default)]
    pub ngap_ip_list: Vec<String>,

    /// SCTP listener port.
    #[serde(rename = "ngappPort", default = "default_ngap_port")]
    pub ngap_port: u16,

    /// Destination gRPC port on each discovered AMF.
    #[serde(rename = "sctpGrpcPort", default)]
    pub sctp_grpc_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub uri: String,
}

fn default_ngap_port() -> u16 {
    DEFAULT_NGAP_PORT
}

impl Config {
    /// Reads and parses the configuration file. A file without a
    /// `configuration` block is rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let content = fs::read(path)?;
        Config::parse(&content)
    }

    pub fn parse(content: &[u8]) -> Result<Config> {
        let raw: RawConfig = serde_yaml::from_slice(content)?;
        let configuration = raw.configuration.ok_or(Error::ErrMissingConfiguration)?;
        Ok(Config {
            info: raw.info,
            configuration,
        })
    }
}
