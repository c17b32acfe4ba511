//! 监听地址配置

use std::net::{IpAddr, SocketAddr};

use crate::env::{web, EnvError, EnvResult, EnvVar};
use crate::translation::ServiceConfig;

/// Web 服务器配置
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl WebConfig {
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        Self {
            bind_addr: config.bind_address.clone(),
            port: config.port,
        }
    }

    /// 地址必须是 IP 字面量或 `localhost`，端口不能为 0
    pub fn validate(&self) -> EnvResult<()> {
        let host = self.bind_addr.trim();
        if host.is_empty() {
            return Err(EnvError::new(web::BindAddress::NAME, "Bind address cannot be empty"));
        }
        if host != "localhost" && host.parse::<IpAddr>().is_err() {
            return Err(EnvError::new(
                web::BindAddress::NAME,
                format!("'{}' is not an IP address", host),
            ));
        }
        if self.port == 0 {
            return Err(EnvError::new(web::Port::NAME, "Port cannot be 0"));
        }
        Ok(())
    }

    pub fn listen_address(&self) -> String {
        match self.bind_addr.trim().parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.bind_addr.trim(), self.port),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::from_service_config(&ServiceConfig::default())
    }
}
