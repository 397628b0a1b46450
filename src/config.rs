use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_name(name: &str) -> Self {
        if name.trim() == "prod" {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: Environment,
    pub port: u16,
    pub database: DatabaseConfig,
    pub push: PushConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub environment: Environment,
    pub apns: ApnsConfig,
    pub fcm: FcmConfig,
    pub delivery_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsConfig {
    pub sandbox: ApnsEndpoint,
    pub production: ApnsEndpoint,
    pub sound: String,
    /// Upper bound on simultaneous connections to the gateway.
    pub max_connections: usize,
}

/// Gateway address plus the client certificate pair presented to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApnsEndpoint {
    pub gateway: String,
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub endpoint: String,
    pub server_key: String,
    pub debug_package: String,
    pub release_package: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let environment = Environment::from_name(&env::var("APP_ENV").unwrap_or_default());

        Ok(Config {
            environment,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "memory://".to_string()),
                namespace: env::var("DATABASE_NAMESPACE")
                    .unwrap_or_else(|_| "campus".to_string()),
                database: env::var("DATABASE_NAME").unwrap_or_else(|_| "main".to_string()),
                username: env::var("DATABASE_USER").ok(),
                password: env::var("DATABASE_PASS").ok(),
            },

            push: PushConfig {
                environment,
                apns: ApnsConfig {
                    sandbox: ApnsEndpoint {
                        gateway: env::var("APNS_SANDBOX_GATEWAY")
                            .unwrap_or_else(|_| "gateway.sandbox.push.apple.com:2195".to_string()),
                        cert_path: env::var("APNS_SANDBOX_CERT")
                            .unwrap_or_else(|_| "certs/apns_sandbox_cert.pem".to_string()),
                        key_path: env::var("APNS_SANDBOX_KEY")
                            .unwrap_or_else(|_| "certs/apns_sandbox_key.pem".to_string()),
                    },
                    production: ApnsEndpoint {
                        gateway: env::var("APNS_PRODUCTION_GATEWAY")
                            .unwrap_or_else(|_| "gateway.push.apple.com:2195".to_string()),
                        cert_path: env::var("APNS_PRODUCTION_CERT")
                            .unwrap_or_else(|_| "certs/apns_production_cert.pem".to_string()),
                        key_path: env::var("APNS_PRODUCTION_KEY")
                            .unwrap_or_else(|_| "certs/apns_production_key.pem".to_string()),
                    },
                    sound: env::var("APNS_SOUND").unwrap_or_else(|_| "bingbong.aiff".to_string()),
                    max_connections: env::var("APNS_MAX_CONNECTIONS")
                        .unwrap_or_else(|_| "16".to_string())
                        .parse()
                        .unwrap_or(16),
                },
                fcm: FcmConfig {
                    endpoint: env::var("FCM_ENDPOINT")
                        .unwrap_or_else(|_| "https://fcm.googleapis.com/fcm/send".to_string()),
                    server_key: env::var("FCM_SERVER_KEY")?,
                    debug_package: env::var("FCM_DEBUG_PACKAGE")
                        .unwrap_or_else(|_| "fr.insapp.insapp.debug".to_string()),
                    release_package: env::var("FCM_RELEASE_PACKAGE")
                        .unwrap_or_else(|_| "fr.insapp.insapp".to_string()),
                },
                delivery_timeout_secs: env::var("DELIVERY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
        })
    }
}

impl DatabaseConfig {
    pub fn memory() -> Self {
        Self {
            url: "memory://".to_string(),
            namespace: "campus".to_string(),
            database: "main".to_string(),
            username: None,
            password: None,
        }
    }
}

impl PushConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

impl ApnsConfig {
    pub fn endpoint_for(&self, environment: Environment) -> &ApnsEndpoint {
        if environment.is_production() {
            &self.production
        } else {
            &self.sandbox
        }
    }
}

impl FcmConfig {
    pub fn package_for(&self, environment: Environment) -> &str {
        if environment.is_production() {
            &self.release_package
        } else {
            &self.debug_package
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            apns: ApnsConfig {
                sandbox: ApnsEndpoint {
                    gateway: "gateway.sandbox.push.apple.com:2195".to_string(),
                    cert_path: "certs/apns_sandbox_cert.pem".to_string(),
                    key_path: "certs/apns_sandbox_key.pem".to_string(),
                },
                production: ApnsEndpoint {
                    gateway: "gateway.push.apple.com:2195".to_string(),
                    cert_path: "certs/apns_production_cert.pem".to_string(),
                    key_path: "certs/apns_production_key.pem".to_string(),
                },
                sound: "bingbong.aiff".to_string(),
                max_connections: 16,
            },
            fcm: FcmConfig {
                endpoint: "https://fcm.googleapis.com/fcm/send".to_string(),
                server_key: String::new(),
                debug_package: "fr.insapp.insapp.debug".to_string(),
                release_package: "fr.insapp.insapp".to_string(),
            },
            delivery_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from_name("prod"), Environment::Production);
        assert_eq!(Environment::from_name("staging"), Environment::Development);
        assert_eq!(Environment::from_name(""), Environment::Development);
    }

    #[test]
    fn test_endpoint_selection_follows_environment() {
        let config = PushConfig::default();

        let sandbox = config.apns.endpoint_for(Environment::Development);
        assert_eq!(sandbox.gateway, "gateway.sandbox.push.apple.com:2195");
        assert_eq!(sandbox.cert_path, "certs/apns_sandbox_cert.pem");

        let production = config.apns.endpoint_for(Environment::Production);
        assert_eq!(production.gateway, "gateway.push.apple.com:2195");
        assert_eq!(production.key_path, "certs/apns_production_key.pem");

        assert_eq!(config.fcm.package_for(Environment::Development), "fr.insapp.insapp.debug");
        assert_eq!(config.fcm.package_for(Environment::Production), "fr.insapp.insapp");
    }
}
