use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{OnceCell, Semaphore};
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{
    self,
    ClientConfig,
    RootCertStore,
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, pem::PemObject},
};

use crate::config::{ApnsConfig, ApnsEndpoint, Environment};
use crate::error::{DeliveryResult, NotifyError};
use crate::models::{device::Platform, notification::Notification};
use crate::services::gateway::GatewayClient;

const COMMAND_NOTIFICATION: u8 = 1;
const COMMAND_ERROR_RESPONSE: u8 = 8;
const MAX_PAYLOAD_BYTES: usize = 2048;
const ERROR_RESPONSE_WINDOW: Duration = Duration::from_millis(500);

/// iOS delivery over the binary provider protocol.
pub struct ApnsGateway {
    config: ApnsConfig,
    environment: Environment,
    next_identifier: AtomicU32,
    error_window: Duration,
    sandbox_tls: OnceCell<Arc<ClientConfig>>,
    production_tls: OnceCell<Arc<ClientConfig>>,
    connections: Semaphore,
}

impl ApnsGateway {
    pub fn new(config: ApnsConfig, environment: Environment) -> Self {
        let connections = Semaphore::new(config.max_connections.max(1));
        Self {
            config,
            environment,
            next_identifier: AtomicU32::new(1),
            error_window: ERROR_RESPONSE_WINDOW,
            sandbox_tls: OnceCell::new(),
            production_tls: OnceCell::new(),
            connections,
        }
    }

    /// Gateway and certificate pair for the configured environment.
    pub fn endpoint(&self) -> &ApnsEndpoint {
        self.config.endpoint_for(self.environment)
    }

    pub fn build_payload(&self, notification: &Notification, badge: u32) -> Value {
        let mut payload = json!({
            "aps": {
                "alert": notification.message,
                "badge": badge,
                "sound": self.config.sound,
            },
            "id": notification.id,
            "type": notification.notification_type,
            "sender": notification.sender,
            "content": notification.content,
            "message": notification.message,
        });

        if notification.notification_type.is_comment_related() {
            if let Some(comment) = &notification.comment {
                payload["comment"] = json!(comment.id);
            }
        }

        payload
    }

    /// Client TLS settings for the current environment, read from disk once.
    async fn tls_config(&self) -> Result<Arc<ClientConfig>> {
        let cell = if self.environment.is_production() {
            &self.production_tls
        } else {
            &self.sandbox_tls
        };
        let endpoint = self.endpoint();
        let config = cell
            .get_or_try_init(|| async { load_tls_config(endpoint).await.map(Arc::new) })
            .await?;
        Ok(config.clone())
    }

    async fn connect(&self, endpoint: &ApnsEndpoint) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        let tls = self.tls_config().await?;

        let host = endpoint.gateway
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(endpoint.gateway.as_str());
        let server_name = ServerName::try_from(host.to_string())
            .with_context(|| format!("invalid APNs host {}", host))?;

        let tcp = TcpStream::connect(endpoint.gateway.as_str())
            .await
            .with_context(|| format!("connecting to {}", endpoint.gateway))?;

        let stream = TlsConnector::from(tls)
            .connect(server_name, tcp)
            .await
            .context("APNs TLS handshake failed")?;
        Ok(stream)
    }
}

#[async_trait]
impl GatewayClient for ApnsGateway {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn deliver(&self, token: &str, notification: &Notification, badge: u32) -> DeliveryResult {
        let endpoint = self.endpoint();
        let payload = serde_json::to_vec(&self.build_payload(notification, badge))
            .map_err(|e| NotifyError::gateway(Platform::Ios, e.to_string()))?;

        let identifier = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(token, identifier, &payload)
            .map_err(|e| NotifyError::gateway(Platform::Ios, e.to_string()))?;

        log::debug!(
            "Sending iOS notification {} via {} (badge {})",
            notification.id,
            endpoint.gateway,
            badge
        );

        let _slot = self.connections
            .acquire()
            .await
            .map_err(|e| NotifyError::gateway(Platform::Ios, e.to_string()))?;
        let mut stream = self.connect(endpoint)
            .await
            .map_err(|e| NotifyError::gateway(Platform::Ios, format!("{:#}", e)))?;

        let outcome = exchange(&mut stream, &frame, self.error_window)
            .await
            .map_err(|e| NotifyError::gateway(Platform::Ios, format!("{:#}", e)));
        let _ = stream.shutdown().await;

        match outcome? {
            None => Ok(()),
            Some(status) => Err(NotifyError::gateway(Platform::Ios, describe_status(status))),
        }
    }
}

/// Enhanced notification frame: command, identifier, expiry, token, payload.
pub fn encode_frame(token: &str, identifier: u32, payload: &[u8]) -> Result<Bytes> {
    let token = hex::decode(token.trim()).context("device token is not hex")?;
    if token.is_empty() {
        return Err(anyhow!("device token is empty"));
    }
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(anyhow!("payload is {} bytes, limit is {}", payload.len(), MAX_PAYLOAD_BYTES));
    }

    let mut frame = BytesMut::with_capacity(1 + 4 + 4 + 2 + token.len() + 2 + payload.len());
    frame.put_u8(COMMAND_NOTIFICATION);
    frame.put_u32(identifier);
    // Expiry 0: the gateway makes a single attempt and does not store it
    frame.put_u32(0);
    frame.put_u16(token.len() as u16);
    frame.put_slice(&token);
    frame.put_u16(payload.len() as u16);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Writes `frame` and waits up to `window` for an error response.
///
/// Returns the non-zero status if the gateway rejected the notification.
/// Silence or a closed connection means it was accepted.
pub async fn exchange<S>(stream: &mut S, frame: &[u8], window: Duration) -> Result<Option<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(frame).await.context("writing APNs frame")?;
    stream.flush().await?;

    let mut reply = [0u8; 6];
    match tokio::time::timeout(window, stream.read_exact(&mut reply)).await {
        Err(_) => Ok(None),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Ok(Err(e)) => Err(e).context("reading APNs response"),
        Ok(Ok(_)) => {
            if reply[0] != COMMAND_ERROR_RESPONSE {
                return Err(anyhow!("unexpected APNs response command {}", reply[0]));
            }
            let status = reply[1];
            let identifier = u32::from_be_bytes([reply[2], reply[3], reply[4], reply[5]]);
            log::debug!("APNs response for notification #{}: status {}", identifier, status);
            Ok((status != 0).then_some(status))
        }
    }
}

pub fn describe_status(status: u8) -> String {
    let reason = match status {
        1 => "processing error",
        2 => "missing device token",
        3 => "missing topic",
        4 => "missing payload",
        5 => "invalid token size",
        6 => "invalid topic size",
        7 => "invalid payload size",
        8 => "invalid token",
        10 => "shutdown",
        _ => "unknown error",
    };
    format!("APNs status {} ({})", status, reason)
}

async fn load_tls_config(endpoint: &ApnsEndpoint) -> Result<ClientConfig> {
    let cert_pem = tokio::fs::read(&endpoint.cert_path)
        .await
        .with_context(|| format!("reading APNs certificate {}", endpoint.cert_path))?;
    let key_pem = tokio::fs::read(&endpoint.key_path)
        .await
        .with_context(|| format!("reading APNs key {}", endpoint.key_path))?;

    let certs = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("invalid certificate PEM {}: {:?}", endpoint.cert_path, e))?;
    let key = PrivateKeyDer::from_pem_slice(&key_pem)
        .map_err(|e| anyhow!("invalid key PEM {}: {:?}", endpoint.key_path, e))?;

    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)?;
    Ok(config)
}
