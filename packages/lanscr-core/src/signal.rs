//! Named per-port stop signal.
//!
//! One Unix-domain socket per server, `lanscr-stop-<port>.sock` in the
//! runtime directory (the Unix rendering of the Windows named event
//! `Local\LANSCR_STOP_<port>`). The primitive serves three roles:
//!
//! - **Admission lock**: creating the socket is the check for "at most one
//!   server per port per host"; a live socket refuses the second start.
//! - **Cross-process stop**: any process that can connect may write `STOP`
//!   to request a graceful shutdown. The socket is world-writable on
//!   purpose, so a non-elevated caller can stop an elevated server on the
//!   same host. This mirrors the permissive DACL of the original named
//!   event and is an explicit LAN-trust decision.
//! - **Detection**: a `PING` (or bare connect) answers without side effects,
//!   which is how `detect` enumerates running instances.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::constants::STOP_SOCKET_PREFIX;
use crate::error::Result;

/// Directory holding the stop-signal namespace.
pub fn namespace_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

fn socket_path(dir: &Path, port: u16) -> PathBuf {
    dir.join(format!("{STOP_SOCKET_PREFIX}{port}.sock"))
}

/// A held stop signal: the admission lock plus the cancellation root every
/// server loop observes.
#[derive(Debug)]
pub struct StopSignal {
    path: PathBuf,
    token: CancellationToken,
}

impl StopSignal {
    /// Claims the stop signal for `port` in the default namespace.
    ///
    /// Fails with [`crate::Error::AlreadyRunning`] when another live server
    /// holds it. A stale socket left by an unclean exit is reclaimed.
    pub fn create(port: u16) -> Result<Self> {
        Self::create_in(&namespace_dir(), port)
    }

    /// Claims the stop signal in an explicit namespace directory.
    pub fn create_in(dir: &Path, port: u16) -> Result<Self> {
        let token = CancellationToken::new();
        let path = imp::create(dir, port, token.clone())?;
        Ok(Self { path, token })
    }

    /// The cancellation root. Cancelled when any process signals a stop.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for StopSignal {
    fn drop(&mut self) {
        self.token.cancel();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Requests a graceful stop of the server on `port`. Returns `false` when no
/// live signal answered.
pub async fn request_stop(port: u16) -> bool {
    request_stop_in(&namespace_dir(), port).await
}

pub async fn request_stop_in(dir: &Path, port: u16) -> bool {
    imp::signal(&socket_path(dir, port), b"STOP").await
}

/// Probes whether a server holds the stop signal for `port`, without
/// stopping it.
pub async fn is_running(port: u16) -> bool {
    is_running_in(&namespace_dir(), port).await
}

pub async fn is_running_in(dir: &Path, port: u16) -> bool {
    imp::signal(&socket_path(dir, port), b"PING").await
}

/// Enumerates ports with a live stop signal, ascending.
pub async fn detect() -> Vec<u16> {
    detect_in(&namespace_dir()).await
}

pub async fn detect_in(dir: &Path) -> Vec<u16> {
    let mut ports = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return ports;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name
            .strip_prefix(STOP_SOCKET_PREFIX)
            .and_then(|rest| rest.strip_suffix(".sock"))
        else {
            continue;
        };
        if let Ok(port) = stem.parse::<u16>() {
            if is_running_in(dir, port).await {
                ports.push(port);
            }
        }
    }
    ports.sort_unstable();
    ports
}

#[cfg(unix)]
mod imp {
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{UnixListener, UnixStream};
    use tokio_util::sync::CancellationToken;

    use crate::constants::STOP_SIGNAL_TIMEOUT;
    use crate::error::{Error, Result};

    use super::socket_path;

    pub fn create(dir: &Path, port: u16, token: CancellationToken) -> Result<PathBuf> {
        let path = socket_path(dir, port);
        let listener = match UnixListener::bind(&path) {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                // Either a live server or a stale socket from an unclean
                // exit: only a successful connect means live.
                if std::os::unix::net::UnixStream::connect(&path).is_ok() {
                    return Err(Error::AlreadyRunning(port));
                }
                std::fs::remove_file(&path)?;
                UnixListener::bind(&path)?
            }
            Err(e) => return Err(e.into()),
        };
        // World-writable: any local user may probe or stop this server.
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666));

        tokio::spawn(accept_loop(listener, token, port));
        Ok(path)
    }

    async fn accept_loop(listener: UnixListener, token: CancellationToken, port: u16) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                res = listener.accept() => {
                    let Ok((stream, _)) = res else { continue };
                    handle_peer(stream, &token, port).await;
                }
            }
        }
    }

    async fn handle_peer(mut stream: UnixStream, token: &CancellationToken, port: u16) {
        let mut buf = [0u8; 4];
        let n = match tokio::time::timeout(STOP_SIGNAL_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            _ => 0,
        };
        let _ = stream.write_all(b"OK\n").await;
        if &buf[..n] == b"STOP" {
            log::info!("Stop requested for port {port}");
            token.cancel();
        }
    }

    /// Connects, writes `payload`, and waits for the acknowledgement.
    pub async fn signal(path: &Path, payload: &[u8]) -> bool {
        let op = async {
            let mut stream = UnixStream::connect(path).await.ok()?;
            stream.write_all(payload).await.ok()?;
            let mut ack = [0u8; 3];
            let _ = stream.read(&mut ack).await;
            Some(())
        };
        matches!(
            tokio::time::timeout(STOP_SIGNAL_TIMEOUT, op).await,
            Ok(Some(()))
        )
    }
}

#[cfg(not(unix))]
mod imp {
    use std::path::{Path, PathBuf};

    use tokio_util::sync::CancellationToken;

    use crate::error::{Error, Result};

    pub fn create(_dir: &Path, _port: u16, _token: CancellationToken) -> Result<PathBuf> {
        Err(Error::Unsupported)
    }

    pub async fn signal(_path: &Path, _payload: &[u8]) -> bool {
        false
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn create_then_probe_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let signal = StopSignal::create_in(dir.path(), 8000).unwrap();
        let token = signal.token();

        assert!(is_running_in(dir.path(), 8000).await);
        assert!(!is_running_in(dir.path(), 8001).await);
        assert!(!token.is_cancelled(), "a probe must not stop the server");

        assert!(request_stop_in(dir.path(), 8000).await);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("stop request cancels the token");
    }

    #[tokio::test]
    async fn second_create_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let _first = StopSignal::create_in(dir.path(), 8000).unwrap();
        match StopSignal::create_in(dir.path(), 8000) {
            Err(crate::Error::AlreadyRunning(8000)) => {}
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_socket_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(dir.path(), 8000);
        // A listener that goes away without unlinking its socket file.
        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());

        let signal = StopSignal::create_in(dir.path(), 8000).unwrap();
        assert!(is_running_in(dir.path(), 8000).await);
        drop(signal);
        assert!(!path.exists(), "drop removes the socket file");
    }

    #[tokio::test]
    async fn detect_lists_live_ports() {
        let dir = tempfile::tempdir().unwrap();
        let _a = StopSignal::create_in(dir.path(), 9000).unwrap();
        let _b = StopSignal::create_in(dir.path(), 8000).unwrap();
        assert_eq!(detect_in(dir.path()).await, vec![8000, 9000]);
    }

    #[tokio::test]
    async fn stop_request_against_nothing_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!request_stop_in(dir.path(), 4242).await);
        assert!(detect_in(dir.path()).await.is_empty());
    }

    #[test]
    fn second_create_result_debug_formats() {
        // AlreadyRunning carries the port for the operator message.
        let err = crate::Error::AlreadyRunning(8000);
        assert_eq!(err.to_string(), "A server is already running for port 8000");
    }
}
