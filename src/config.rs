use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::domain::ComputationType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub bus: BusConfig,
    /// Engine endpoints keyed by [`ComputationType::config_key`]
    pub engines: BTreeMap<String, EngineEndpoint>,
    pub report: ServiceEndpoint,
    pub builder: ServiceEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Outbound calls to engines and collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Buffered events per inbound destination
    pub channel_capacity: usize,
    pub notification_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEndpoint {
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// The engine completes the computation inside the run call
    #[serde(default)]
    pub synchronous: bool,
}

fn default_api_version() -> String {
    "v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        let engines = ComputationType::all()
            .enumerate()
            .map(|(i, t)| {
                (
                    t.config_key().to_string(),
                    EngineEndpoint {
                        base_url: format!("http://127.0.0.1:{}", 5030 + i),
                        api_version: default_api_version(),
                        synchronous: t == ComputationType::LoadFlow,
                    },
                )
            })
            .collect();
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                request_timeout_secs: 30,
                enable_cors: false,
                cors_origin: "http://localhost:3000".to_string(),
            },
            http: HttpConfig {
                timeout_secs: 10,
                connect_timeout_secs: 3,
            },
            bus: BusConfig {
                channel_capacity: 256,
                notification_capacity: 1024,
            },
            engines,
            report: ServiceEndpoint {
                base_url: "http://127.0.0.1:5028".to_string(),
            },
            builder: ServiceEndpoint {
                base_url: "http://127.0.0.1:5007".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("GRIDSTUDY__").split("__"));
        Ok(figment.extract()?)
    }

    pub fn engine(&self, computation: ComputationType) -> Option<&EngineEndpoint> {
        self.engines.get(computation.config_key())
    }
}
