//! Per-instance repository configuration.

use std::path::PathBuf;
use std::time::Duration;

use astron_config::Config;
use astron_net::protocol::{CA_PORT, DBSS_DEFAULT, MD_PORT, STATE_SERVER_DEFAULT};
use astron_net::{Channel, FrameConfig};

use crate::error::RepositoryError;
use crate::view::ViewRole;

/// Which side of the cluster a repository speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Message director, enveloped internal messages.
    Internal,
    /// Client agent, bare client messages.
    Client,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Internal => MD_PORT,
            Protocol::Client => CA_PORT,
        }
    }
}

/// Everything a repository needs, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub dc_file: PathBuf,
    pub poll_rate_hz: f64,
    /// Client heartbeat period inside `poll_forever`.
    pub heartbeat_interval: Duration,
    pub frame: FrameConfig,
    /// AI channel to claim; one is allocated when `None`.
    pub ai_channel: Option<Channel>,
    pub state_server: Channel,
    pub dbss: Channel,
    pub connection_name: Option<String>,
    pub client_version: String,
    /// Overrides the computed DC hash in `CLIENT_HELLO`.
    pub dc_hash: Option<u32>,
    /// Views instantiated for objects entering this repository.
    pub view_role: ViewRole,
}

impl RepositoryConfig {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            host: "127.0.0.1".to_string(),
            port: protocol.default_port(),
            dc_file: PathBuf::from("example.dc"),
            poll_rate_hz: 30.0,
            heartbeat_interval: Duration::from_secs(10),
            frame: FrameConfig::default(),
            ai_channel: None,
            state_server: STATE_SERVER_DEFAULT,
            dbss: DBSS_DEFAULT,
            connection_name: None,
            client_version: "astron-dev".to_string(),
            dc_hash: None,
            view_role: match protocol {
                Protocol::Internal => ViewRole::Ai,
                Protocol::Client => ViewRole::Client,
            },
        }
    }

    /// Internal repository settings, connecting to the message director port.
    pub fn internal(config: &Config) -> Self {
        Self::from_config(Protocol::Internal, config)
    }

    /// Client repository settings, connecting to the client agent port.
    pub fn client(config: &Config) -> Self {
        Self::from_config(Protocol::Client, config)
    }

    fn from_config(protocol: Protocol, config: &Config) -> Self {
        let network = &config.network;
        let port = match protocol {
            Protocol::Internal => network.internal_port,
            Protocol::Client => network.client_port,
        };
        Self {
            host: network.host.clone(),
            port,
            dc_file: config.schema.dc_file.clone(),
            poll_rate_hz: network.poll_rate_hz,
            heartbeat_interval: Duration::from_secs(u64::from(network.heartbeat_seconds)),
            frame: FrameConfig {
                max_payload_size: network.max_datagram_size,
            },
            ai_channel: config.cluster.ai_channel,
            state_server: config.cluster.state_server_channel,
            dbss: config.cluster.dbss_channel,
            connection_name: config.cluster.connection_name.clone(),
            client_version: config.schema.client_version.clone(),
            dc_hash: config.schema.dc_hash,
            ..Self::new(protocol)
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Delay between two polls.
    pub fn poll_interval(&self) -> Result<Duration, RepositoryError> {
        poll_interval(self.poll_rate_hz)
    }
}

pub(crate) fn poll_interval(hz: f64) -> Result<Duration, RepositoryError> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(RepositoryError::InvalidPollRate(hz));
    }
    Ok(Duration::from_secs_f64(1.0 / hz))
}
