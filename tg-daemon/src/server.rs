//! Control Socket Server
//!
//! Line-delimited JSON over a Unix socket. The server never touches sensors
//! itself; every request that needs daemon state is forwarded to the poll
//! loop and answered from there.
//!
//! # Security Features
//! - **Socket permissions**: Owner-only mode with symlink attack prevention
//! - **Peer credentials**: UID/GID/PID audit logging for every request
//! - **Connection limits**: Maximum concurrent connections enforced
//! - **Timeouts**: Read/write timeouts prevent resource exhaustion
//! - **Message limits**: Maximum request size prevents memory exhaustion

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use tg_error::{Result, ThermError};
use tg_protocol::{Request, RequestEnvelope, Response, ResponseEnvelope, MAX_MESSAGE_SIZE};

use crate::poll_loop::ControlCommand;

// ============================================================================
// Security Constants
// ============================================================================

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 64;

/// Read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per message
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a request may wait for the poll loop; one slow tick fits inside
const REPLY_TIMEOUT: Duration = Duration::from_secs(15);

/// Socket permissions (owner only)
const SOCKET_MODE: u32 = 0o600;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy, Default)]
struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

pub async fn run_server(
    socket_path: &Path,
    commands: mpsc::Sender<ControlCommand>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = bind(socket_path)?;

    info!(
        socket = %socket_path.display(),
        mode = %format_args!("{:o}", SOCKET_MODE),
        max_connections = MAX_CONNECTIONS,
        max_message = MAX_MESSAGE_SIZE,
        "Control socket listening"
    );

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, _addr)) => {
                    let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
                    if current >= MAX_CONNECTIONS {
                        warn!(current, "Connection limit reached, rejecting new connection");
                        continue;
                    }

                    ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        handle_client(stream, commands).await;
                        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                Err(e) => error!(error = %e, "Accept error"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    info!("Control socket closed");
    Ok(())
}

/// Bind the socket, replacing a stale one but never following a symlink
fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Ok(metadata) = socket_path.symlink_metadata() {
        if metadata.file_type().is_symlink() {
            return Err(ThermError::invalid_path(
                socket_path,
                "socket path is a symlink, refusing",
            ));
        }
        std::fs::remove_file(socket_path).map_err(|e| ThermError::FileWrite {
            path: socket_path.to_path_buf(),
            source: e,
        })?;
        debug!("Removed existing socket file");
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    Ok(listener)
}

async fn handle_client(stream: UnixStream, commands: mpsc::Sender<ControlCommand>) {
    let cred = get_peer_credentials(&stream).unwrap_or_default();
    debug!(uid = cred.uid, gid = cred.gid, pid = cred.pid, "Client connected");

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(1024);
    let mut request_count: u64 = 0;

    loop {
        let read_result = timeout(
            READ_TIMEOUT,
            read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE),
        )
        .await;

        let response = match read_result {
            Ok(Ok(0)) => {
                debug!(uid = cred.uid, pid = cred.pid, requests = request_count, "Client disconnected");
                break;
            }
            Ok(Ok(n)) => {
                request_count += 1;
                trace!(uid = cred.uid, bytes = n, "Request received");
                match std::str::from_utf8(&line) {
                    Ok(text) => process_request(text, &cred, &commands).await,
                    Err(_) => ResponseEnvelope::new(0, Response::error("Invalid request encoding")),
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(uid = cred.uid, pid = cred.pid, max = MAX_MESSAGE_SIZE, "Message too large");
                let _ = send_response(&mut writer, &ResponseEnvelope::new(0, Response::error("Message too large"))).await;
                break;
            }
            Ok(Err(e)) => {
                error!(uid = cred.uid, pid = cred.pid, error = %e, "Read error");
                break;
            }
            Err(_) => {
                debug!(uid = cred.uid, pid = cred.pid, "Read timeout");
                break;
            }
        };

        if send_response(&mut writer, &response).await.is_err() {
            break;
        }
    }
}

async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(out.len());
        }

        let (take_len, found_newline) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if take_len > max_len.saturating_sub(out.len()) {
            let consume_len = max_len.saturating_sub(out.len()).min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &ResponseEnvelope,
) -> std::result::Result<(), ()> {
    let mut json = serde_json::to_vec(response).unwrap_or_else(|_| {
        br#"{"id":0,"status":"error","message":"Serialization error"}"#.to_vec()
    });
    json.push(b'\n');

    match timeout(WRITE_TIMEOUT, writer.write_all(&json)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "Write error");
            Err(())
        }
        Err(_) => {
            error!("Write timeout");
            Err(())
        }
    }
}

/// Get peer credentials (uid, gid, pid) from Unix socket
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();

    // SAFETY: ucred is a plain C struct; all-zero is a valid value.
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: fd is a live socket owned by `stream`, and cred/len describe a
    // buffer of exactly size_of::<ucred>() bytes.
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    (result == 0).then_some(PeerCredentials {
        uid: cred.uid,
        gid: cred.gid,
        pid: cred.pid,
    })
}

/// Process a single request line and build the response envelope
async fn process_request(
    line: &str,
    cred: &PeerCredentials,
    commands: &mpsc::Sender<ControlCommand>,
) -> ResponseEnvelope {
    let envelope: RequestEnvelope = match serde_json::from_str(line.trim()) {
        Ok(e) => e,
        Err(e) => {
            debug!(uid = cred.uid, error = %e, "Invalid request JSON");
            return ResponseEnvelope::new(0, Response::error("Invalid request format"));
        }
    };

    let id = envelope.id;
    let request = envelope.request;

    if let Err(e) = request.validate() {
        warn!(uid = cred.uid, error = %e, "Request validation failed");
        return ResponseEnvelope::new(id, Response::error(e));
    }

    debug!(request = request.type_name(), id, uid = cred.uid, pid = cred.pid, "Processing request");

    let response = match request {
        Request::Ping => Response::ok_string("pong"),

        Request::Version => Response::ok_string(format!("thermguardd {}", env!("CARGO_PKG_VERSION"))),

        Request::Dump => match ask(commands, |reply| ControlCommand::Dump { reply }).await {
            Ok(text) => Response::ok_string(text),
            Err(e) => Response::error(e),
        },

        Request::ListSensors => {
            match ask(commands, |reply| ControlCommand::ListSensors { reply }).await {
                Ok(sensors) => Response::ok_sensors(sensors),
                Err(e) => Response::error(e),
            }
        }

        Request::TestOverride { sensor, millidegrees } => {
            info!(
                sensor = %sensor,
                millidegrees,
                uid = cred.uid,
                pid = cred.pid,
                "AUDIT: TestOverride"
            );
            let reply = ask(commands, |reply| ControlCommand::TestOverride {
                sensor,
                millidegrees,
                reply,
            })
            .await;
            match reply.and_then(|r| r) {
                Ok(()) => Response::ok(),
                Err(e) => Response::error(e),
            }
        }

        Request::Exit => {
            info!(uid = cred.uid, pid = cred.pid, "AUDIT: Exit");
            match ask(commands, |reply| ControlCommand::Exit { reply }).await.and_then(|r| r) {
                Ok(()) => Response::ok(),
                Err(e) => Response::error(e),
            }
        }
    };

    ResponseEnvelope::new(id, response)
}

/// Forward a command to the poll loop and wait for its answer
async fn ask<T>(
    commands: &mpsc::Sender<ControlCommand>,
    build: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
) -> std::result::Result<T, String> {
    let (reply, rx) = oneshot::channel();
    commands
        .send(build(reply))
        .await
        .map_err(|_| "Poll loop is not running".to_string())?;

    match timeout(REPLY_TIMEOUT, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err("Poll loop dropped the request".to_string()),
        Err(_) => Err("Timed out waiting for poll loop".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_protocol::SensorSnapshot;

    fn snapshot(name: &str) -> SensorSnapshot {
        SensorSnapshot {
            name: name.into(),
            subsystem: "base".into(),
            location: "inlet".into(),
            status: "normal".into(),
            fan_state: "normal".into(),
            temperature: 41_000,
            min: 40_000,
            max: 42_000,
            fault_count: 0,
            test_override: None,
        }
    }

    /// Answer commands the way the poll loop would
    fn fake_loop() -> mpsc::Sender<ControlCommand> {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    ControlCommand::Dump { reply } => {
                        let _ = reply.send("Support Dump".into());
                    }
                    ControlCommand::ListSensors { reply } => {
                        let _ = reply.send(vec![snapshot("base-1")]);
                    }
                    ControlCommand::TestOverride { sensor, reply, .. } => {
                        let result = if sensor == "base-1" {
                            Ok(())
                        } else {
                            Err(format!("Sensor does not exist: {}", sensor))
                        };
                        let _ = reply.send(result);
                    }
                    ControlCommand::Exit { reply } => {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
        });
        tx
    }

    async fn call(line: &str, commands: &mpsc::Sender<ControlCommand>) -> ResponseEnvelope {
        process_request(line, &PeerCredentials::default(), commands).await
    }

    #[tokio::test]
    async fn test_ping_and_version() {
        let commands = fake_loop();

        let env = call(r#"{"id":4,"cmd":"Ping"}"#, &commands).await;
        assert_eq!(env.id, 4);
        assert!(matches!(env.response, Response::Ok(ref d) if d.value.as_deref() == Some("pong")));

        let env = call(r#"{"id":5,"cmd":"Version"}"#, &commands).await;
        match env.response {
            Response::Ok(d) => assert!(d.value.unwrap().starts_with("thermguardd ")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forwarded_requests() {
        let commands = fake_loop();

        let env = call(r#"{"id":1,"cmd":"Dump"}"#, &commands).await;
        assert!(matches!(env.response, Response::Ok(ref d) if d.value.as_deref() == Some("Support Dump")));

        let env = call(r#"{"id":2,"cmd":"ListSensors"}"#, &commands).await;
        match env.response {
            Response::Ok(d) => assert_eq!(d.sensors.unwrap()[0].name, "base-1"),
            other => panic!("unexpected {:?}", other),
        }

        let env = call(
            r#"{"id":3,"cmd":"TestOverride","data":{"sensor":"line-9","millidegrees":50000}}"#,
            &commands,
        )
        .await;
        assert!(matches!(env.response, Response::Error { ref message } if message.contains("line-9")));
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let commands = fake_loop();

        let env = call("not json", &commands).await;
        assert_eq!(env.id, 0);
        assert!(matches!(env.response, Response::Error { .. }));

        let env = call(
            r#"{"id":9,"cmd":"TestOverride","data":{"sensor":"base-1","millidegrees":-300000}}"#,
            &commands,
        )
        .await;
        assert_eq!(env.id, 9);
        assert!(matches!(env.response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_stopped_poll_loop_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let env = call(r#"{"id":1,"cmd":"Dump"}"#, &tx).await;
        assert!(matches!(env.response, Response::Error { ref message } if message.contains("not running")));
    }

    #[tokio::test]
    async fn test_read_line_bounded() {
        let data: &[u8] = b"{\"id\":1}\nrest";
        let mut reader = BufReader::new(data);
        let mut line = Vec::new();
        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), 9);
        assert_eq!(line, b"{\"id\":1}\n");

        let long = vec![b'x'; 100];
        let mut reader = BufReader::new(long.as_slice());
        let err = read_line_bounded(&mut reader, &mut line, 64).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tg.sock");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn({
            let path = path.clone();
            let commands = fake_loop();
            async move { run_server(&path, commands, shutdown_rx).await }
        });

        let stream = loop {
            match UnixStream::connect(&path).await {
                Ok(s) => break s,
                Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        };
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SOCKET_MODE);

        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"id\":11,\"cmd\":\"Ping\"}\n").await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        let reply: ResponseEnvelope =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply.id, 11);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
        assert!(!path.exists());
    }
}
