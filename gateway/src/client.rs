//! Typed client for the gateway protocol: one method per request, reply
//! status checking and payload decoding included.
//!
//! Requests on one client are strictly sequential; open several clients for
//! parallelism. Call [`GatewayClient::close`] to let the server retire the
//! handler instead of waiting for the socket to drop.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::info;

use sat_comm::Session;

use crate::protocol::{
    DirectionReply, FrequenciesReply, PointReply, ResponseType, SamplePoint, SatelliteInfo,
    StationInfo, BULK_REPLY_BYTES, CLOSE_SENTINEL, DATA_REPLY_BYTES, STATUS_REPLY_BYTES,
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("server reported an error for request '{0}'")]
    Server(String),
    #[error("unexpected reply '{digit}' for request '{request}'")]
    UnexpectedReply { request: String, digit: String },
    #[error("undecodable reply payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("undecodable datetime in reply: {0}")]
    BadInstant(#[from] chrono::ParseError),
    #[error("unreadable reply field: {0}")]
    BadField(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct GatewayClient {
    stream: TcpStream,
}

impl GatewayClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
        })
    }

    /// Ask the server to retire this connection's handler.
    pub async fn close(mut self) -> std::io::Result<()> {
        self.stream.write_all(CLOSE_SENTINEL).await
    }

    // ---- configuration ----

    pub async fn setup_ground_station(
        &mut self,
        longitude: f64,
        latitude: f64,
        altitude: f64,
        elevation: f64,
        station_name: &str,
    ) -> Result<()> {
        self.request_status(
            "setup_ground_station",
            json!({"request": "setup_ground_station", "body": {
                "longitude": longitude,
                "latitude": latitude,
                "altitude": altitude,
                "elevation": elevation,
                "station_name": station_name,
            }}),
            ResponseType::Configure,
        )
        .await
    }

    pub async fn setup_satellite(
        &mut self,
        station_name: &str,
        norad_id: u32,
        uplink: Option<f64>,
        downlink: Option<f64>,
    ) -> Result<()> {
        self.request_status(
            "setup_satellite",
            json!({"request": "setup_satellite", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "uplink": uplink,
                "downlink": downlink,
            }}),
            ResponseType::Configure,
        )
        .await
    }

    pub async fn setup_comm(&mut self, station_name: &str, norad_id: u32) -> Result<()> {
        self.request_status(
            "setup_comm",
            json!({"request": "setup_comm", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
            }}),
            ResponseType::Configure,
        )
        .await
    }

    pub async fn setup_new_frequencies(
        &mut self,
        station_name: &str,
        norad_id: u32,
        uplink: f64,
        downlink: f64,
    ) -> Result<()> {
        self.request_status(
            "setup_new_frequencies",
            json!({"request": "setup_new_frequencies", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "uplink": uplink,
                "downlink": downlink,
            }}),
            ResponseType::Configure,
        )
        .await
    }

    pub async fn clear_ground_station_data(&mut self, station_name: &str) -> Result<()> {
        self.request_status(
            "clear_ground_station_data",
            json!({"request": "clear_ground_station_data", "body": {
                "station_name": station_name,
            }}),
            ResponseType::Configure,
        )
        .await
    }

    // ---- TLE management ----

    pub async fn setup_new_tle_by_str(
        &mut self,
        station_name: &str,
        norad_id: u32,
        tle_str: &str,
    ) -> Result<()> {
        self.request_status(
            "setup_new_tle_by_str",
            json!({"request": "setup_new_tle_by_str", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "tle_str": tle_str,
            }}),
            ResponseType::TleUpdate,
        )
        .await
    }

    pub async fn setup_new_tle_by_file(
        &mut self,
        station_name: &str,
        norad_id: u32,
        tle_file_name: &str,
        default_folder: bool,
    ) -> Result<()> {
        self.request_status(
            "setup_new_tle_by_file",
            json!({"request": "setup_new_tle_by_file", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "tle_file_name": tle_file_name,
                "default_folder": default_folder,
            }}),
            ResponseType::TleUpdate,
        )
        .await
    }

    pub async fn setup_new_tle_by_spacetrack(
        &mut self,
        station_name: &str,
        norad_id: u32,
    ) -> Result<()> {
        self.request_status(
            "setup_new_tle_by_spacetrack",
            json!({"request": "setup_new_tle_by_spacetrack", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
            }}),
            ResponseType::TleUpdate,
        )
        .await
    }

    pub async fn update_tles_by_spacetrack(
        &mut self,
        station_name: &str,
        norad_ids: &[u32],
    ) -> Result<()> {
        self.request_status(
            "update_tles_by_spacetrack",
            json!({"request": "update_tles_by_spacetrack", "body": {
                "station_name": station_name,
                "norad_ids": norad_ids,
            }}),
            ResponseType::TleUpdate,
        )
        .await
    }

    // ---- prediction ----

    pub async fn predict_comm(
        &mut self,
        station_name: &str,
        norad_id: u32,
        start_prediction: Option<NaiveDateTime>,
        time_prediction: f64,
        step_prediction: f64,
    ) -> Result<()> {
        self.request_status(
            "predict_comm",
            json!({"request": "predict_comm", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "start_prediction": start_prediction,
                "time_prediction": time_prediction,
                "step_prediction": step_prediction,
            }}),
            ResponseType::Predict,
        )
        .await
    }

    // ---- queries ----

    pub async fn get_setuped_stations(&mut self) -> Result<HashMap<String, StationInfo>> {
        self.request_data(
            "get_setuped_stations",
            json!({"request": "get_setuped_stations"}),
            DATA_REPLY_BYTES,
        )
        .await
    }

    pub async fn get_station_satellites_info(
        &mut self,
        station_name: &str,
    ) -> Result<HashMap<u32, SatelliteInfo>> {
        let raw: HashMap<String, SatelliteInfo> = self
            .request_data(
                "get_station_satellites_info",
                json!({"request": "get_station_satellites_info", "body": {
                    "station_name": station_name,
                }}),
                DATA_REPLY_BYTES,
            )
            .await?;

        raw.into_iter()
            .map(|(norad_id, info)| {
                norad_id
                    .parse::<u32>()
                    .map(|id| (id, info))
                    .map_err(|_| ClientError::BadField(format!("catalog number '{norad_id}'")))
            })
            .collect()
    }

    pub async fn get_azimuth_elevation(
        &mut self,
        station_name: &str,
        norad_id: u32,
        dt: Option<NaiveDateTime>,
    ) -> Result<DirectionReply> {
        self.request_data(
            "get_azimuth_elevation",
            json!({"request": "get_azimuth_elevation", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "dt": dt,
            }}),
            DATA_REPLY_BYTES,
        )
        .await
    }

    pub async fn get_frequencies(
        &mut self,
        station_name: &str,
        norad_id: u32,
        dt: Option<NaiveDateTime>,
    ) -> Result<FrequenciesReply> {
        self.request_data(
            "get_frequencies",
            json!({"request": "get_frequencies", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "dt": dt,
            }}),
            DATA_REPLY_BYTES,
        )
        .await
    }

    pub async fn get_data(
        &mut self,
        station_name: &str,
        norad_id: u32,
        dt: Option<NaiveDateTime>,
    ) -> Result<PointReply> {
        self.request_data(
            "get_data",
            json!({"request": "get_data", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
                "dt": dt,
            }}),
            DATA_REPLY_BYTES,
        )
        .await
    }

    pub async fn get_comm_sessions_params(
        &mut self,
        station_name: &str,
        norad_id: u32,
    ) -> Result<BTreeMap<NaiveDateTime, Session>> {
        let raw: BTreeMap<String, Session> = self
            .request_data(
                "get_comm_sessions_params",
                json!({"request": "get_comm_sessions_params", "body": {
                    "station_name": station_name,
                    "norad_id": norad_id,
                }}),
                BULK_REPLY_BYTES,
            )
            .await?;

        raw.into_iter()
            .map(|(start, session)| Ok((start.parse::<NaiveDateTime>()?, session)))
            .collect()
    }

    /// Full per-instant dump of the predicted data. The reply must fit the
    /// bulk class, so keep the prediction horizon short before calling.
    pub async fn get_all_data(
        &mut self,
        station_name: &str,
        norad_id: u32,
    ) -> Result<Vec<SamplePoint>> {
        self.request_data(
            "get_all_data",
            json!({"request": "get_all_data", "body": {
                "station_name": station_name,
                "norad_id": norad_id,
            }}),
            BULK_REPLY_BYTES,
        )
        .await
    }

    // ---- transport ----

    async fn request_status(
        &mut self,
        request: &str,
        frame: Value,
        expected: ResponseType,
    ) -> Result<()> {
        self.stream.write_all(frame.to_string().as_bytes()).await?;

        let mut buf = [0u8; STATUS_REPLY_BYTES];
        let read = self.stream.read(&mut buf).await?;
        check_digit(request, &buf[..read], expected)
    }

    /// Data replies can span several segments; keep reading until the frame
    /// decodes (payload JSON plus the trailing digit) or the reply-class
    /// buffer is exhausted.
    async fn request_data<T: DeserializeOwned>(
        &mut self,
        request: &str,
        frame: Value,
        reply_size: usize,
    ) -> Result<T> {
        self.stream.write_all(frame.to_string().as_bytes()).await?;

        let data_digit = b'0' + ResponseType::GetData as u8;
        let error_digit = b'0' + ResponseType::Error as u8;

        let mut buf = vec![0u8; reply_size];
        let mut filled = 0;
        loop {
            let read = self.stream.read(&mut buf[filled..]).await?;
            filled += read;
            let raw = &buf[..filled];

            if raw.len() == 1 && raw[0] == error_digit {
                return Err(ClientError::Server(request.into()));
            }
            if raw.last() == Some(&data_digit) {
                if let Ok(value) = serde_json::from_slice(&raw[..raw.len() - 1]) {
                    info!("request {request} completed");
                    return Ok(value);
                }
            }
            if read == 0 || filled == buf.len() {
                let digit = raw.last().map(|d| char::from(*d).to_string()).unwrap_or_default();
                return Err(ClientError::UnexpectedReply {
                    request: request.into(),
                    digit,
                });
            }
        }
    }
}

fn check_digit(request: &str, digit: &[u8], expected: ResponseType) -> Result<()> {
    match digit {
        [d] if *d == b'0' + expected as u8 => {
            info!("request {request} completed");
            Ok(())
        }
        [d] if *d == b'0' + ResponseType::Error as u8 => Err(ClientError::Server(request.into())),
        other => Err(ClientError::UnexpectedReply {
            request: request.into(),
            digit: String::from_utf8_lossy(other).into_owned(),
        }),
    }
}
