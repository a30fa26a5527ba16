//! Connection lifecycle: transport setup, handshake, socket binding.

use super::error::ConnectError;
use super::handshake::{self, ClientHello, HelloStatus};
use super::state::{LinkState, LinkStatus};
use crate::adb::{self, AdbDevice, AdbTunnel};
use crate::config::{ControlConfig, LinkConfig, PipelineConfig, VideoCodec};
use crate::control::{ControlChannel, ControlMessage};
use crate::telemetry::PerformanceTelemetry;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportKind {
    /// ADB port forward over USB; the device ref is an ADB serial.
    Usb,
    /// Direct TCP; the device ref is `host[:port]`.
    Wifi,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Usb => f.write_str("USB"),
            TransportKind::Wifi => f.write_str("WiFi"),
        }
    }
}

/// Video parameters the device agreed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub codec: VideoCodec,
    pub bitrate_bps: u32,
    pub max_fps: u16,
    pub touch_points: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Serial (USB) or `host:port` (WiFi)
    pub id: String,
    pub name: String,
    pub transport: TransportKind,
    pub video: VideoParams,
}

pub struct DeviceLink {
    config: LinkConfig,
    control_config: ControlConfig,
    pipeline_config: PipelineConfig,
    telemetry: Arc<PerformanceTelemetry>,
}

impl DeviceLink {
    pub fn new(config: LinkConfig, telemetry: Arc<PerformanceTelemetry>) -> Self {
        Self {
            config,
            control_config: ControlConfig::default(),
            pipeline_config: PipelineConfig::default(),
            telemetry,
        }
    }

    pub fn with_control_config(mut self, config: ControlConfig) -> Self {
        self.control_config = config;
        self
    }

    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Devices known to the local ADB server.
    pub async fn list_devices(&self) -> Result<Vec<AdbDevice>, ConnectError> {
        adb::list_devices(self.config.connect_timeout).await
    }

    /// Opens both sockets and negotiates stream parameters.
    ///
    /// Fails without retrying; the caller decides whether to reconnect.
    pub async fn connect(
        &self,
        device_ref: &str,
        transport: TransportKind,
    ) -> Result<Session, ConnectError> {
        self.config.validate()?;
        self.pipeline_config.validate()?;

        let link = LinkStatus::new();
        link.advance(LinkState::Connecting);
        info!("🔗 Connecting to {} over {}", device_ref, transport);

        let mut tunnel = None;
        let result = self
            .establish(device_ref, transport, &link, &mut tunnel)
            .await;
        match result {
            Ok(session) => Ok(session),
            Err(e) => {
                link.fail(e.to_string());
                if let Some(tunnel) = tunnel {
                    tunnel.close().await;
                }
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        device_ref: &str,
        transport: TransportKind,
        link: &Arc<LinkStatus>,
        tunnel_slot: &mut Option<AdbTunnel>,
    ) -> Result<Session, ConnectError> {
        let config = &self.config;
        let endpoint = match transport {
            TransportKind::Usb => {
                let tunnel = AdbTunnel::open(
                    device_ref,
                    &config.device_socket,
                    config.local_port,
                    config.connect_timeout,
                )
                .await?;
                let addr = tunnel.local_addr();
                *tunnel_slot = Some(tunnel);
                addr
            }
            TransportKind::Wifi => resolve_wifi(device_ref, config.wifi_port).await?,
        };

        let mut video = open_socket(endpoint, config.connect_timeout).await?;
        link.advance(LinkState::Handshaking);

        let hello = ClientHello::from_config(config);
        let reply = tokio::time::timeout(
            config.handshake_timeout,
            handshake::negotiate(&mut video, &hello),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            duration: config.handshake_timeout,
            description: "handshake".to_string(),
        })??;

        match reply.status {
            HelloStatus::Ok => {}
            HelloStatus::Busy => return Err(ConnectError::TransportBusy),
            HelloStatus::UnsupportedTransport => {
                return Err(ConnectError::UnsupportedTransport { transport });
            }
            HelloStatus::UnsupportedCodec => {
                return Err(ConnectError::NegotiationFailed {
                    reason: format!("device cannot encode {:?}", config.codec),
                });
            }
            HelloStatus::BadParams => {
                return Err(ConnectError::NegotiationFailed {
                    reason: "device rejected the requested parameters".to_string(),
                });
            }
        }
        if reply.codec != config.codec {
            return Err(ConnectError::NegotiationFailed {
                reason: format!(
                    "requested {:?}, device offered {:?}",
                    config.codec, reply.codec
                ),
            });
        }

        let control = open_socket(endpoint, config.connect_timeout).await?;
        let device = Device {
            id: device_ref.to_string(),
            name: reply.device_name,
            transport,
            video: VideoParams {
                width: reply.width,
                height: reply.height,
                codec: reply.codec,
                bitrate_bps: config.bitrate_bps,
                max_fps: config.max_fps,
                touch_points: config.touch_points,
            },
        };

        let control = ControlChannel::bind(
            control,
            Arc::clone(link),
            config.touch_points,
            &self.control_config,
            Arc::clone(&self.telemetry),
        );
        link.advance(LinkState::Streaming);
        info!(
            "📱 Streaming from '{}' {}x{} ({:?})",
            device.name, device.video.width, device.video.height, device.video.codec
        );

        Ok(Session {
            device,
            link: Arc::clone(link),
            control,
            video: Mutex::new(Some(video)),
            tasks: Mutex::new(Vec::new()),
            tunnel: Mutex::new(tunnel_slot.take()),
            pipeline_config: self.pipeline_config.clone(),
            telemetry: Arc::clone(&self.telemetry),
        })
    }

    pub fn status(&self, session: &Session) -> LinkState {
        session.status()
    }

    pub async fn disconnect(&self, session: Session) {
        session.close().await;
    }
}

async fn open_socket(endpoint: SocketAddr, timeout: Duration) -> Result<TcpStream, ConnectError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
        .await
        .map_err(|_| ConnectError::Timeout {
            duration: timeout,
            description: format!("connect to {endpoint}"),
        })??;
    stream.set_nodelay(true)?;
    debug!("Socket connected to {}", endpoint);
    Ok(stream)
}

async fn resolve_wifi(device_ref: &str, default_port: u16) -> Result<SocketAddr, ConnectError> {
    if let Ok(addr) = device_ref.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let target = if device_ref.contains(':') {
        device_ref.to_string()
    } else {
        format!("{device_ref}:{default_port}")
    };
    tokio::net::lookup_host(target)
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConnectError::DeviceNotFound {
            device: device_ref.to_string(),
        })
}

/// One live connection. Dropping it aborts the workers; prefer
/// [`DeviceLink::disconnect`] for an orderly shutdown.
pub struct Session {
    device: Device,
    link: Arc<LinkStatus>,
    control: ControlChannel,
    video: Mutex<Option<TcpStream>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    tunnel: Mutex<Option<AdbTunnel>>,
    pipeline_config: PipelineConfig,
    telemetry: Arc<PerformanceTelemetry>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("state", &self.status())
            .finish()
    }
}

impl Session {
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn status(&self) -> LinkState {
        self.link.state()
    }

    pub fn link(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.link)
    }

    pub fn control(&self) -> ControlChannel {
        self.control.clone()
    }

    pub fn telemetry(&self) -> Arc<PerformanceTelemetry> {
        Arc::clone(&self.telemetry)
    }

    pub(crate) fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline_config
    }

    pub(crate) fn take_video_stream(&self) -> Option<TcpStream> {
        self.video.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub(crate) fn attach_task(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task);
    }

    fn abort_tasks(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            task.abort();
        }
    }

    async fn close(self) {
        let was_streaming = self.link.is_streaming();
        self.link.advance(LinkState::Disconnecting);
        if was_streaming {
            // Best effort: lets the device release its encoder immediately.
            if let Err(e) = self.control.send_raw(ControlMessage::Disconnect).await {
                debug!("Disconnect message not sent: {}", e);
            }
        }
        self.abort_tasks();
        self.video.lock().unwrap_or_else(|e| e.into_inner()).take();
        let tunnel = self.tunnel.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tunnel) = tunnel {
            tunnel.close().await;
        }
        if !self.link.advance(LinkState::Disconnected) {
            warn!("Link was in state {} at disconnect", self.link.state());
        }
        info!("🔌 Disconnected from {}", self.device.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
