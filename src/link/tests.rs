// Tests for the device link
// A fake device listens on 127.0.0.1 and speaks the handshake, so these run
// over the WiFi transport without adb or hardware.

use super::handshake::{self, ClientHello, DeviceHello, HelloStatus};
use super::*;
use crate::config::{LinkConfig, VideoCodec};
use crate::control::ControlMessage;
use crate::telemetry::PerformanceTelemetry;
use crate::video::{AccessUnit, VideoError, VideoPipeline};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct DeviceSide {
    hello: ClientHello,
    video: TcpStream,
    control: Option<TcpStream>,
}

/// Accepts one session. `reply` builds the device hello from the request;
/// the control socket is only accepted when the reply is `Ok`.
async fn fake_device(
    reply: impl FnOnce(&ClientHello) -> DeviceHello + Send + 'static,
) -> (SocketAddr, JoinHandle<DeviceSide>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut video, _) = listener.accept().await.unwrap();
        let hello = handshake::accept(&mut video).await.unwrap();
        let answer = reply(&hello);
        video.write_all(&answer.encode()).await.unwrap();
        let control = if answer.status == HelloStatus::Ok {
            Some(listener.accept().await.unwrap().0)
        } else {
            None
        };
        DeviceSide {
            hello,
            video,
            control,
        }
    });
    (addr, handle)
}

fn accept_all(hello: &ClientHello) -> DeviceHello {
    DeviceHello {
        status: HelloStatus::Ok,
        device_name: "Fake Pixel".to_string(),
        codec: hello.codec,
        width: 2,
        height: 2,
    }
}

fn raw_config() -> LinkConfig {
    LinkConfig {
        codec: VideoCodec::RawRgba,
        touch_points: 2,
        max_fps: 0,
        ..LinkConfig::default()
    }
}

fn device_link(config: LinkConfig) -> DeviceLink {
    DeviceLink::new(config, Arc::new(PerformanceTelemetry::new()))
}

// ============================================================
// CONNECT
// ============================================================

#[tokio::test]
async fn test_connect_reaches_streaming_with_negotiated_params() {
    let (addr, device) = fake_device(accept_all).await;
    let link = device_link(raw_config());

    let session = link
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .expect("connect should succeed");

    assert_eq!(session.status(), LinkState::Streaming);
    assert_eq!(link.status(&session), LinkState::Streaming);
    let info = session.device();
    assert_eq!(info.name, "Fake Pixel");
    assert_eq!(info.transport, TransportKind::Wifi);
    assert_eq!((info.video.width, info.video.height), (2, 2));
    assert_eq!(info.video.codec, VideoCodec::RawRgba);

    let side = device.await.unwrap();
    assert_eq!(side.hello, ClientHello::from_config(&raw_config()));
    assert!(side.control.is_some());
}

#[tokio::test]
async fn test_busy_device_is_transport_busy() {
    let (addr, _device) = fake_device(|hello| DeviceHello {
        status: HelloStatus::Busy,
        ..accept_all(hello)
    })
    .await;

    let err = device_link(raw_config())
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::TransportBusy), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_codec_mismatch_fails_negotiation() {
    let (addr, _device) = fake_device(|hello| DeviceHello {
        codec: VideoCodec::H264,
        ..accept_all(hello)
    })
    .await;

    let err = device_link(raw_config())
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ConnectError::NegotiationFailed { .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_unsupported_transport_status() {
    let (addr, _device) = fake_device(|hello| DeviceHello {
        status: HelloStatus::UnsupportedTransport,
        ..accept_all(hello)
    })
    .await;

    let err = device_link(raw_config())
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectError::UnsupportedTransport {
            transport: TransportKind::Wifi
        }
    ));
}

#[tokio::test]
async fn test_invalid_params_rejected_before_any_io() {
    let config = LinkConfig {
        touch_points: 0,
        ..raw_config()
    };
    // Nothing listens on port 9; an attempt to dial would surface as Io.
    let err = device_link(config)
        .connect("127.0.0.1:9", TransportKind::Wifi)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::InvalidParams(_)), "got {err:?}");
}

#[tokio::test]
async fn test_refused_connection_is_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = device_link(raw_config())
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::Io(_)), "got {err:?}");
}

// ============================================================
// STREAMING AND TEARDOWN
// ============================================================

#[tokio::test]
async fn test_frames_and_input_flow_over_live_session() {
    let (addr, device) = fake_device(accept_all).await;
    let session = device_link(raw_config())
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap();
    let mut side = device.await.unwrap();

    let mut producer = VideoPipeline::start(&session).unwrap();
    let unit = AccessUnit {
        pts: 7,
        config: false,
        key_frame: true,
        payload: vec![0x40; 16],
    };
    side.video.write_all(&unit.to_wire()).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), producer.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.pts(), 7);
    assert_eq!(frame.pixel(1, 1), Some([0x40; 4]));

    session.control().key_down(4).unwrap();
    let mut control = side.control.take().unwrap();
    let mut buf = [0u8; 3];
    tokio::time::timeout(Duration::from_secs(2), control.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let (msg, _) = ControlMessage::decode(&buf).unwrap().unwrap();
    assert_eq!(msg, ControlMessage::KeyDown { keycode: 4 });
}

#[tokio::test]
async fn test_second_pipeline_start_is_rejected() {
    let (addr, _device) = fake_device(accept_all).await;
    let session = device_link(raw_config())
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap();

    let _producer = VideoPipeline::start(&session).unwrap();
    assert!(matches!(
        VideoPipeline::start(&session),
        Err(VideoError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_device_closing_video_fails_control_calls() {
    let (addr, device) = fake_device(accept_all).await;
    let session = device_link(raw_config())
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap();
    let side = device.await.unwrap();
    let mut producer = VideoPipeline::start(&session).unwrap();
    let reader = producer.reader();
    let mut states = session.link().subscribe();

    drop(side.video);
    tokio::time::timeout(
        Duration::from_secs(2),
        states.wait_for(|s| *s == LinkState::Error),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(session.link().last_error().is_some());
    assert!(reader.latest().is_none());
    let err = session.control().key_down(4).unwrap_err();
    assert!(err.is_disconnect());
    let end = tokio::time::timeout(Duration::from_secs(2), producer.next())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_disconnect_sends_farewell_and_ends_disconnected() {
    let (addr, device) = fake_device(accept_all).await;
    let link = device_link(raw_config());
    let session = link
        .connect(&addr.to_string(), TransportKind::Wifi)
        .await
        .unwrap();
    let status = session.link();
    let control = session.control();
    let mut side = device.await.unwrap();

    link.disconnect(session).await;
    assert_eq!(status.state(), LinkState::Disconnected);
    assert!(control.key_down(4).is_err());

    let mut received = Vec::new();
    let mut device_control = side.control.take().unwrap();
    tokio::time::timeout(
        Duration::from_secs(2),
        device_control.read_to_end(&mut received),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(received, ControlMessage::Disconnect.to_bytes());
}
