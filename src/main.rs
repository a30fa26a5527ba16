mod args;

use android_mirror_run::adb;
use android_mirror_run::config::PipelineConfig;
use android_mirror_run::link::{ConnectError, DeviceLink, Session};
use android_mirror_run::telemetry::PerformanceTelemetry;
use android_mirror_run::video::VideoPipeline;
use args::{Args, Target};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let Some(args) = Args::parse() else {
        return;
    };

    let default_filter = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to start tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    let code = rt.block_on(run(args));
    std::process::exit(code);
}

async fn run(args: Args) -> i32 {
    let telemetry = Arc::new(PerformanceTelemetry::new());
    let link = DeviceLink::new(args.link.clone(), Arc::clone(&telemetry))
        .with_pipeline_config(PipelineConfig::default());

    if args.list_only {
        return match link.list_devices().await {
            Ok(devices) if devices.is_empty() => {
                println!("No devices found");
                0
            }
            Ok(devices) => {
                for device in devices {
                    let size = if device.is_ready() {
                        adb::query_screen_size(&device.serial, args.link.connect_timeout)
                            .await
                            .ok()
                            .flatten()
                            .map(|(w, h)| format!("{w}x{h}"))
                    } else {
                        None
                    };
                    println!(
                        "{}\t{}\t{}",
                        device.serial,
                        device.state,
                        size.as_deref().unwrap_or("-")
                    );
                }
                0
            }
            Err(e) => {
                error!("❌ Device listing failed: {}", e);
                1
            }
        };
    }

    let device_ref = match &args.target {
        Target::Usb(serial) => serial.clone(),
        Target::Wifi(addr) => addr.clone(),
        Target::FirstUsb => match first_ready_device(&link).await {
            Ok(serial) => serial,
            Err(e) => {
                error!("❌ {}", e);
                return 1;
            }
        },
    };

    let session = match link.connect(&device_ref, args.transport()).await {
        Ok(session) => session,
        Err(e) => {
            error!("❌ Connect failed: {}", e);
            if e.is_transient() {
                info!("The device may accept a new connection shortly");
            }
            return 1;
        }
    };

    let code = mirror(&session, &telemetry, args.timeout_secs).await;
    link.disconnect(session).await;
    info!("📊 Final: {}", telemetry.snapshot());
    code
}

async fn first_ready_device(link: &DeviceLink) -> Result<String, ConnectError> {
    let devices = link.list_devices().await?;
    devices
        .into_iter()
        .find(|d| d.is_ready())
        .map(|d| d.serial)
        .ok_or_else(|| ConnectError::DeviceNotFound {
            device: "<first ready>".to_string(),
        })
}

/// Drains frames as the renderer would and logs a telemetry line per second.
async fn mirror(
    session: &Session,
    telemetry: &PerformanceTelemetry,
    timeout_secs: Option<u64>,
) -> i32 {
    let mut producer = match VideoPipeline::start(session) {
        Ok(producer) => producer,
        Err(e) => {
            error!("❌ Video pipeline failed to start: {}", e);
            return 1;
        }
    };

    let deadline = tokio::time::sleep(
        timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(365 * 24 * 3600)),
    );
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            frame = producer.next() => {
                if frame.is_none() {
                    let reason = session.link().last_error().unwrap_or_default();
                    warn!("⚠️ Video stream ended: {}", reason);
                    return 1;
                }
            }
            _ = ticker.tick() => {
                info!("📊 {}", telemetry.snapshot());
            }
            _ = &mut deadline => {
                info!("⏱️ Timeout reached, disconnecting");
                return 0;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Interrupted, disconnecting");
                return 0;
            }
        }
    }
}
