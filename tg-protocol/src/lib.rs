use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum request size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Maximum response size; a support dump grows with the sensor count
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Longest sensor name accepted on the control socket
const MAX_SENSOR_NAME_LENGTH: usize = 64;

/// Sentinel that clears a test temperature override
pub const CLEAR_OVERRIDE: i32 = -1;

/// Test overrides above this are rejected (500 °C)
pub const MAX_OVERRIDE_MILLIDEGREES: i32 = 500_000;

/// Test overrides below absolute zero are rejected
pub const MIN_OVERRIDE_MILLIDEGREES: i32 = -273_000;

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Human readable support dump of every subsystem and sensor
    Dump,
    /// Structured snapshot of every live sensor
    ListSensors,
    /// Force a sensor's reading; `CLEAR_OVERRIDE` restores hardware reads
    TestOverride { sensor: String, millidegrees: i32 },
    /// Stop the daemon between ticks
    Exit,
}

impl Request {
    /// Validate request parameters before sending to daemon
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping
            | Request::Version
            | Request::Dump
            | Request::ListSensors
            | Request::Exit => Ok(()),

            Request::TestOverride { sensor, millidegrees } => {
                validate_sensor_name(sensor)?;
                validate_override(*millidegrees)?;
                Ok(())
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::Dump => "Dump",
            Request::ListSensors => "ListSensors",
            Request::TestOverride { .. } => "TestOverride",
            Request::Exit => "Exit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<SensorSnapshot>>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn sensor_list(s: Vec<SensorSnapshot>) -> Self { Self { sensors: Some(s), ..Self::default() } }
}

/// Published view of one sensor, as the store sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub name: String,
    pub subsystem: String,
    pub location: String,
    pub status: String,
    pub fan_state: String,
    /// Millidegrees Celsius
    pub temperature: i32,
    pub min: i32,
    pub max: i32,
    pub fault_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_override: Option<i32>,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn ok_sensors(s: Vec<SensorSnapshot>) -> Self {
        Response::Ok(ResponseData::sensor_list(s))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }
}

/// Sensor names are `<subsystem>-<number>`; restrict to the characters that
/// can appear there.
pub fn validate_sensor_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Sensor name cannot be empty".into());
    }

    if name.len() > MAX_SENSOR_NAME_LENGTH {
        return Err(format!(
            "Sensor name too long: {} > {} chars",
            name.len(),
            MAX_SENSOR_NAME_LENGTH
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(format!("Sensor name contains invalid character: {:?}", c));
        }
    }

    Ok(())
}

/// Signed millidegrees; `CLEAR_OVERRIDE` is the only reserved value
pub fn validate_override(millidegrees: i32) -> Result<(), String> {
    if millidegrees == CLEAR_OVERRIDE {
        return Ok(());
    }
    if millidegrees < MIN_OVERRIDE_MILLIDEGREES {
        return Err(format!(
            "Test temperature below absolute zero (minimum {} millidegrees)",
            MIN_OVERRIDE_MILLIDEGREES
        ));
    }
    if millidegrees > MAX_OVERRIDE_MILLIDEGREES {
        return Err(format!(
            "Test temperature too high (maximum {} millidegrees)",
            MAX_OVERRIDE_MILLIDEGREES
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let env = RequestEnvelope::with_id(
            Request::TestOverride {
                sensor: "base-1".into(),
                millidegrees: 91_000,
            },
            7,
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"cmd\":\"TestOverride\""));
        assert!(json.contains("\"id\":7"));

        let parsed: RequestEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request, env.request);
    }

    #[test]
    fn test_unit_request_parses_without_data() {
        let parsed: RequestEnvelope = serde_json::from_str(r#"{"id":3,"cmd":"Dump"}"#).unwrap();
        assert_eq!(parsed.request, Request::Dump);
    }

    #[test]
    fn test_override_validation() {
        assert!(validate_override(CLEAR_OVERRIDE).is_ok());
        assert!(validate_override(0).is_ok());
        assert!(validate_override(45_500).is_ok());
        assert!(validate_override(MAX_OVERRIDE_MILLIDEGREES + 1).is_err());
    }

    #[test]
    fn test_override_accepts_sub_zero() {
        assert!(validate_override(-2).is_ok());
        assert!(validate_override(-5_000).is_ok());
        assert!(validate_override(MIN_OVERRIDE_MILLIDEGREES).is_ok());
        assert!(validate_override(MIN_OVERRIDE_MILLIDEGREES - 1).is_err());
        assert!(validate_override(-274_000).is_err());
    }

    #[test]
    fn test_sensor_name_validation() {
        assert!(validate_sensor_name("base-1").is_ok());
        assert!(validate_sensor_name("").is_err());
        assert!(validate_sensor_name("base;rm").is_err());
        assert!(validate_sensor_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let env = ResponseEnvelope::new(1, Response::error("Sensor does not exist"));
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("Sensor does not exist"));
    }
}
