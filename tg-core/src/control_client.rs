//! Control Client
//!
//! Talks to a running thermguardd over its Unix socket. One request per line,
//! one response per line, both JSON.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tg_protocol::{
    generate_request_id, Request, RequestEnvelope, Response, ResponseData, ResponseEnvelope,
    SensorSnapshot, MAX_MESSAGE_SIZE, MAX_RESPONSE_SIZE,
};

use crate::error::{Result, ThermError};

const TIMEOUT: Duration = Duration::from_secs(5);

pub struct ControlClient {
    socket_path: PathBuf,
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl ControlClient {
    pub fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&socket_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                ThermError::DaemonNotAvailable
            }
            _ => ThermError::DaemonConnection(format!("{}: {}", socket_path.display(), e)),
        })?;

        stream.set_read_timeout(Some(TIMEOUT))?;
        stream.set_write_timeout(Some(TIMEOUT))?;
        let reader_stream = stream.try_clone()?;

        Ok(Self {
            socket_path,
            writer: stream,
            reader: BufReader::new(reader_stream),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and wait for its response
    pub fn request(&mut self, request: Request) -> Result<ResponseData> {
        request.validate().map_err(ThermError::IpcProtocol)?;

        let id = generate_request_id();
        let mut json = serde_json::to_vec(&RequestEnvelope::with_id(request, id))?;
        json.push(b'\n');
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(ThermError::MessageTooLarge {
                size: json.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        self.writer.write_all(&json).map_err(|e| {
            ThermError::DaemonConnection(format!("Failed to send request: {}", e))
        })?;

        let mut buf = Vec::with_capacity(4096);
        let read = (&mut self.reader)
            .take(MAX_RESPONSE_SIZE as u64 + 1)
            .read_until(b'\n', &mut buf)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    ThermError::Timeout("waiting for daemon response".into())
                }
                _ => ThermError::DaemonConnection(format!("Failed to read response: {}", e)),
            })?;

        if read == 0 {
            return Err(ThermError::DaemonConnection("Daemon closed connection".into()));
        }
        if buf.len() > MAX_RESPONSE_SIZE {
            return Err(ThermError::MessageTooLarge {
                size: buf.len(),
                max_size: MAX_RESPONSE_SIZE,
            });
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }

        let envelope: ResponseEnvelope = serde_json::from_slice(&buf)?;
        if envelope.id != id {
            return Err(ThermError::IpcProtocol(format!(
                "Response ID mismatch: expected {}, got {}",
                id, envelope.id
            )));
        }

        match envelope.response {
            Response::Ok(data) => Ok(data),
            Response::Error { message } => Err(ThermError::DaemonResponse(message)),
        }
    }

    fn request_value(&mut self, request: Request) -> Result<String> {
        let kind = request.type_name();
        self.request(request)?
            .value
            .ok_or_else(|| ThermError::IpcProtocol(format!("{} response carried no value", kind)))
    }

    pub fn ping(&mut self) -> Result<String> {
        self.request_value(Request::Ping)
    }

    pub fn version(&mut self) -> Result<String> {
        self.request_value(Request::Version)
    }

    pub fn dump(&mut self) -> Result<String> {
        self.request_value(Request::Dump)
    }

    pub fn list_sensors(&mut self) -> Result<Vec<SensorSnapshot>> {
        self.request(Request::ListSensors)?
            .sensors
            .ok_or_else(|| ThermError::IpcProtocol("ListSensors response carried no sensors".into()))
    }

    /// Force `sensor` to `millidegrees`; `-1` clears the override
    pub fn test_override(&mut self, sensor: &str, millidegrees: i32) -> Result<()> {
        self.request(Request::TestOverride {
            sensor: sensor.to_string(),
            millidegrees,
        })
        .map(|_| ())
    }

    pub fn exit(&mut self) -> Result<()> {
        self.request(Request::Exit).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;
    use tempfile::TempDir;

    /// Answer one request with whatever `respond` builds
    fn serve_once<F>(listener: UnixListener, respond: F) -> thread::JoinHandle<()>
    where
        F: FnOnce(RequestEnvelope) -> String + Send + 'static,
    {
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let envelope: RequestEnvelope = serde_json::from_str(line.trim()).unwrap();
            let mut out = stream;
            out.write_all(respond(envelope).as_bytes()).unwrap();
            out.write_all(b"\n").unwrap();
        })
    }

    #[test]
    fn test_missing_socket_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = ControlClient::connect(dir.path().join("none.sock")).err().unwrap();
        assert!(matches!(err, ThermError::DaemonNotAvailable));
    }

    #[test]
    fn test_dump_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tg.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = serve_once(listener, |env| {
            assert_eq!(env.request, Request::Dump);
            serde_json::to_string(&ResponseEnvelope::new(env.id, Response::ok_string("dump text")))
                .unwrap()
        });

        let mut client = ControlClient::connect(&path).unwrap();
        assert_eq!(client.dump().unwrap(), "dump text");
        server.join().unwrap();
    }

    #[test]
    fn test_error_response_surfaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tg.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = serve_once(listener, |env| {
            serde_json::to_string(&ResponseEnvelope::new(
                env.id,
                Response::error("Unknown sensor: x-1"),
            ))
            .unwrap()
        });

        let mut client = ControlClient::connect(&path).unwrap();
        let err = client.test_override("x-1", 50_000).unwrap_err();
        assert!(matches!(err, ThermError::DaemonResponse(ref m) if m.contains("x-1")));
        server.join().unwrap();
    }

    #[test]
    fn test_mismatched_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tg.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = serve_once(listener, |env| {
            serde_json::to_string(&ResponseEnvelope::new(env.id + 1000, Response::ok_string("pong")))
                .unwrap()
        });

        let mut client = ControlClient::connect(&path).unwrap();
        assert!(matches!(client.ping(), Err(ThermError::IpcProtocol(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_invalid_request_never_sent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tg.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let mut client = ControlClient::connect(&path).unwrap();
        assert!(matches!(
            client.test_override("../etc", 1_000),
            Err(ThermError::IpcProtocol(_))
        ));
    }
}
