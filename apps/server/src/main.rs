//! lanscr - share this machine's screen and audio over the LAN.
//!
//! One binary, several roles: the HTTP server (MJPEG + streaming WAV), the
//! datagram server and its subscriber, plus one-shot control actions
//! (audio-mute, stop, detect) that talk to a running instance.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use lanscr_capture::{platform_grabber, BitmapJpegEncoder, SystemLoopbackFactory};
use lanscr_core::capture::AudioSourceFactory;
use lanscr_core::{
    control, run_http_server, run_udp_client, run_udp_server, signal, AuthConfig, Error,
    FrameSink, Result, ServerOptions, UdpServerOptions,
};

/// LANSCR - LAN screen and audio sharing.
#[derive(Parser, Debug)]
#[command(name = "lanscr")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log request lines and subscriber lifecycle events.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Require HTTP Basic Auth with explicit credentials.
    #[arg(long, global = true, value_name = "USER:PASS")]
    auth: Option<String>,

    /// Require HTTP Basic Auth with generated credentials (printed at startup).
    #[arg(long, global = true)]
    private: bool,

    /// Start the server with audio muted.
    #[arg(long, global = true)]
    mute_audio: bool,

    /// Disable the audio endpoint entirely.
    #[arg(long, global = true)]
    no_audio: bool,

    /// Start viewer playback muted (forwarded to the attached viewer).
    #[arg(long, global = true)]
    mute: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (MJPEG video + streaming WAV audio).
    Server {
        #[arg(default_value_t = 8000)]
        port: u16,
        /// Frames per second, clamped to 1-60 (0 = default).
        #[arg(default_value_t = lanscr_core::constants::DEFAULT_HTTP_FPS)]
        fps: u32,
        /// JPEG quality, clamped to 1-100.
        #[arg(default_value_t = lanscr_core::constants::DEFAULT_HTTP_QUALITY as u32)]
        quality: u32,
    },
    /// Start the datagram server (chunked JPEG over UDP).
    UdpServer {
        #[arg(default_value_t = 9000)]
        port: u16,
        /// Frames per second, clamped to 1-120 (0 = default).
        #[arg(default_value_t = lanscr_core::constants::DEFAULT_UDP_FPS)]
        fps: u32,
        /// JPEG quality, clamped to 1-100.
        #[arg(default_value_t = lanscr_core::constants::DEFAULT_UDP_QUALITY as u32)]
        quality: u32,
    },
    /// Subscribe to a datagram server.
    UdpClient { ip: IpAddr, port: u16 },
    /// Set (1) or clear (0) the audio mute flag of a running server.
    /// TARGET is a local port or a server base URL.
    AudioMute { target: String, mute: i32 },
    /// Request a graceful stop of the server on PORT, from any process.
    Stop { port: u16 },
    /// List ports with a running server on this host.
    Detect,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // clap exits 2 for usage errors by convention, but this tool
            // reserves 2 for refused remote actions.
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp_millis()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(match e {
                Error::RemoteRefused(_) | Error::Unauthorized => 2,
                _ => 1,
            })
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let auth = resolve_auth(&cli)?;

    match cli.command {
        Command::Server { port, fps, quality } => {
            let audio: Option<Arc<dyn AudioSourceFactory>> = if cli.no_audio {
                None
            } else {
                Some(Arc::new(SystemLoopbackFactory::new()))
            };
            let options = ServerOptions {
                port,
                fps,
                quality,
                auth,
                start_muted: cli.mute_audio,
                audio,
            };
            run_http_server(options, platform_grabber(), Box::new(BitmapJpegEncoder::new())).await
        }

        Command::UdpServer { port, fps, quality } => {
            run_udp_server(
                UdpServerOptions { port, fps, quality },
                platform_grabber(),
                Box::new(BitmapJpegEncoder::new()),
            )
            .await
        }

        Command::UdpClient { ip, port } => {
            if cli.mute {
                log::info!("Viewer playback starts muted");
            }
            let stop = CancellationToken::new();
            tokio::spawn({
                let stop = stop.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        stop.cancel();
                    }
                }
            });
            run_udp_client(SocketAddr::from((ip, port)), ViewerSink::default(), stop).await
        }

        Command::AudioMute { target, mute } => {
            control::send_mute(&target, mute != 0, auth.as_ref()).await?;
            println!("OK");
            Ok(())
        }

        Command::Stop { port } => {
            if signal::request_stop(port).await {
                log::info!("Stop signal sent to port {port}.");
                Ok(())
            } else {
                Err(Error::RemoteRefused(format!(
                    "No running server detected on port {port} (or access denied)"
                )))
            }
        }

        Command::Detect => {
            let ports = signal::detect().await;
            if ports.is_empty() {
                println!("No running servers detected.");
            } else {
                for port in ports {
                    println!("{port}");
                }
            }
            Ok(())
        }
    }
}

/// `--auth` wins over `--private`; `--private` alone generates and prints
/// credentials.
fn resolve_auth(cli: &Cli) -> Result<Option<AuthConfig>> {
    if let Some(spec) = &cli.auth {
        return AuthConfig::parse(spec).map(Some);
    }
    if cli.private {
        let auth = AuthConfig::private();
        log::info!("Private mode enabled (HTTP Basic Auth).");
        log::info!("Username: {}", auth.user);
        log::info!("Password: {}", auth.pass);
        return Ok(Some(auth));
    }
    Ok(None)
}

/// Headless frame sink for the datagram subscriber: the windowing viewer is
/// an external collaborator, so completed JPEGs are only counted here.
#[derive(Default)]
struct ViewerSink {
    frames: u64,
}

impl FrameSink for ViewerSink {
    fn on_frame(&mut self, jpeg: Bytes) {
        self.frames += 1;
        if self.frames == 1 {
            log::info!("First frame received ({} bytes)", jpeg.len());
        } else if self.frames % 300 == 0 {
            log::debug!("{} frames received", self.frames);
        }
    }
}
