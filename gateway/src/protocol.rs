//! Wire protocol of the gateway.
//!
//! Each request is one UTF-8 JSON object `{"request": <name>, "body": {..}}`
//! read in a single frame of at most [`MAX_REQUEST_BYTES`]. Replies carry a
//! single status digit; data-bearing replies prepend the JSON payload to
//! that digit. Clients size their reads per request kind: 4 bytes for
//! status-only replies, 2048 for small data, 8192 for bulk data. Datetimes
//! travel as ISO 8601 without a timezone and mean UTC.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use sat_comm::CommError;

/// Largest accepted request frame.
pub const MAX_REQUEST_BYTES: usize = 2048;

/// Client-side read sizes per reply class.
pub const STATUS_REPLY_BYTES: usize = 4;
pub const DATA_REPLY_BYTES: usize = 2048;
pub const BULK_REPLY_BYTES: usize = 8192;

/// The literal (non-JSON) frame a client sends to end its connection.
pub const CLOSE_SENTINEL: &[u8] = b"CLOSE";

/// Reply status digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    None = 0,
    Configure = 1,
    Predict = 2,
    TleUpdate = 3,
    Sync = 4,
    Radar = 5,
    GetData = 6,
    Error = 7,
}

/// A decoded request frame.
#[derive(Debug, Deserialize)]
pub struct RequestEnvelope {
    pub request: String,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("request '{0}' arrived without a body")]
    MissingBody(String),
    #[error("request body does not match the expected fields: {0}")]
    BadBody(#[from] serde_json::Error),
    #[error("unreadable datetime: {0}")]
    BadInstant(#[from] chrono::ParseError),
    #[error(transparent)]
    Registry(#[from] CommError),
}

impl RequestEnvelope {
    /// Deserialize the body into the request's parameter struct; a missing
    /// body is its own error so the server can report it distinctly.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        let body = self
            .body
            .clone()
            .ok_or_else(|| HandlerError::MissingBody(self.request.clone()))?;
        Ok(serde_json::from_value(body)?)
    }
}

// ---- request bodies ----

fn default_station_name() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_horizon() -> f64 {
    86_400.0
}

fn default_step() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct SetupGroundStationBody {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default = "default_station_name")]
    pub station_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetupSatelliteBody {
    pub station_name: String,
    pub norad_id: u32,
    #[serde(default)]
    pub uplink: Option<f64>,
    #[serde(default)]
    pub downlink: Option<f64>,
}

/// (station, satellite) addressing shared by several requests.
#[derive(Debug, Deserialize)]
pub struct CommKeyBody {
    pub station_name: String,
    pub norad_id: u32,
}

#[derive(Debug, Deserialize)]
pub struct NewFrequenciesBody {
    pub station_name: String,
    pub norad_id: u32,
    pub uplink: f64,
    pub downlink: f64,
}

#[derive(Debug, Deserialize)]
pub struct TleByStrBody {
    pub station_name: String,
    pub norad_id: u32,
    pub tle_str: String,
}

#[derive(Debug, Deserialize)]
pub struct TleByFileBody {
    pub station_name: String,
    pub norad_id: u32,
    pub tle_file_name: String,
    #[serde(default = "default_true")]
    pub default_folder: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTlesBody {
    pub station_name: String,
    pub norad_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PredictCommBody {
    pub station_name: String,
    pub norad_id: u32,
    #[serde(default)]
    pub start_prediction: Option<String>,
    #[serde(default = "default_horizon")]
    pub time_prediction: f64,
    #[serde(default = "default_step")]
    pub step_prediction: f64,
}

#[derive(Debug, Deserialize)]
pub struct StationKeyBody {
    pub station_name: String,
}

#[derive(Debug, Deserialize)]
pub struct InstantQueryBody {
    pub station_name: String,
    pub norad_id: u32,
    #[serde(default)]
    pub dt: Option<String>,
}

// ---- reply payloads ----

/// Angles at one instant; empty fields when the instant is outside the
/// predicted horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionReply {
    pub dt: NaiveDateTime,
    pub azimuth: Option<f64>,
    pub elevation: Option<f64>,
}

/// Doppler-corrected link frequencies at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequenciesReply {
    pub dt: NaiveDateTime,
    pub uplink: Option<f64>,
    pub downlink: Option<f64>,
}

/// Angles and frequencies at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointReply {
    pub dt: NaiveDateTime,
    pub azimuth: Option<f64>,
    pub elevation: Option<f64>,
    pub uplink: Option<f64>,
    pub downlink: Option<f64>,
}

/// One registered station as reported over the wire, degrees and meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationInfo {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    pub elevation: f64,
}

/// One registered satellite's nominal frequencies and element-set epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteInfo {
    pub uplink: Option<f64>,
    pub downlink: Option<f64>,
    pub tle_dt: Option<NaiveDateTime>,
}

/// One bulk-dump entry of the predicted communication data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePoint {
    pub dt: NaiveDateTime,
    pub azimuth: f64,
    pub elevation: f64,
    pub uplink: Option<f64>,
    pub downlink: Option<f64>,
    pub visibility: bool,
}

// ---- replies ----

/// What a handled request produces before encoding.
#[derive(Debug)]
pub enum Reply {
    Status(ResponseType),
    Data(Value),
}

/// Encode a status-only reply: the digit as a bare JSON integer.
pub fn encode_status(response: ResponseType) -> Vec<u8> {
    (response as u8).to_string().into_bytes()
}

/// Encode a data reply: payload JSON immediately followed by the GetData
/// status digit.
pub fn encode_data(data: &impl Serialize) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(data)?;
    bytes.extend_from_slice(&encode_status(ResponseType::GetData));
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_replies_are_single_digits() {
        assert_eq!(encode_status(ResponseType::Configure), b"1");
        assert_eq!(encode_status(ResponseType::Error), b"7");
        assert_eq!(encode_status(ResponseType::None), b"0");
    }

    #[test]
    fn data_replies_append_the_get_data_digit() {
        let bytes = encode_data(&json!({"azimuth": null})).unwrap();
        assert_eq!(bytes, br#"{"azimuth":null}6"#);
    }

    #[test]
    fn envelope_accepts_defaults_in_bodies() {
        let envelope: RequestEnvelope = serde_json::from_str(
            r#"{"request": "setup_ground_station",
                "body": {"longitude": 50.0, "latitude": 53.0, "altitude": 137}}"#,
        )
        .unwrap();
        let body: SetupGroundStationBody = envelope.body().unwrap();
        assert_eq!(body.station_name, "default");
        assert_eq!(body.elevation, 0.0);
    }

    #[test]
    fn missing_body_is_its_own_error() {
        let envelope: RequestEnvelope =
            serde_json::from_str(r#"{"request": "setup_comm"}"#).unwrap();
        let err = envelope.body::<CommKeyBody>().unwrap_err();
        assert!(matches!(err, HandlerError::MissingBody(_)));
    }

    #[test]
    fn predict_body_defaults_to_one_day_at_one_second() {
        let envelope: RequestEnvelope = serde_json::from_str(
            r#"{"request": "predict_comm", "body": {"station_name": "Samara", "norad_id": 57173}}"#,
        )
        .unwrap();
        let body: PredictCommBody = envelope.body().unwrap();
        assert_eq!(body.time_prediction, 86_400.0);
        assert_eq!(body.step_prediction, 1.0);
        assert_eq!(body.start_prediction, None);
    }
}
