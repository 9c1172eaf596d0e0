//! TCP server: accepts clients, decodes request frames, dispatches into the
//! registry and writes the framed replies.
//!
//! One task per connection. Every dispatch (registry lock + call + encode)
//! runs on the blocking pool, so a long prediction stalls other requests at
//! the lock, never the accept loop. The Predict reply is therefore only
//! written once the computation finished.

use chrono::{NaiveDateTime, NaiveTime};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use sat_comm::Registry;

use crate::protocol::{
    encode_data, encode_status, CommKeyBody, DirectionReply, FrequenciesReply, HandlerError,
    InstantQueryBody, NewFrequenciesBody, PointReply, PredictCommBody, Reply, RequestEnvelope,
    ResponseType, SamplePoint, SatelliteInfo, SetupGroundStationBody, SetupSatelliteBody,
    StationInfo, StationKeyBody, TleByFileBody, TleByStrBody, UpdateTlesBody, CLOSE_SENTINEL,
    MAX_REQUEST_BYTES,
};

pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, registry: SharedRegistry) -> anyhow::Result<()> {
    let connections = Arc::new(AtomicUsize::new(0));

    loop {
        let (socket, peer) = listener.accept().await?;
        let active = connections.fetch_add(1, Ordering::SeqCst) + 1;
        info!("connected to {peer}, {active} active connections");
        tokio::spawn(handle_connection(
            socket,
            peer.to_string(),
            Arc::clone(&registry),
            Arc::clone(&connections),
        ));
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: String,
    registry: SharedRegistry,
    connections: Arc<AtomicUsize>,
) {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];

    loop {
        let read = match socket.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) => {
                warn!("read from {peer} failed: {e}");
                break;
            }
        };

        if &buf[..read] == CLOSE_SENTINEL {
            break;
        }

        let message = String::from_utf8_lossy(&buf[..read]).into_owned();
        let dispatch_registry = Arc::clone(&registry);
        let reply =
            tokio::task::spawn_blocking(move || dispatch_message(&dispatch_registry, &message))
                .await
                .unwrap_or_else(|e| {
                    error!("dispatch task failed: {e}");
                    encode_status(ResponseType::Error)
                });

        if let Err(e) = socket.write_all(&reply).await {
            warn!("write to {peer} failed: {e}");
            break;
        }
    }

    let active = connections.fetch_sub(1, Ordering::SeqCst) - 1;
    info!("disconnected from {peer}, {active} active connections");
}

/// Decode one frame and produce the reply bytes. Request failures never
/// escape: they become a status-7 reply and the connection lives on.
pub fn dispatch_message(registry: &Mutex<Registry>, message: &str) -> Vec<u8> {
    let envelope: RequestEnvelope = match serde_json::from_str(message) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("unreadable request frame: {e}");
            return encode_status(ResponseType::Error);
        }
    };

    info!("request: {}", envelope.request);
    match handle_request(registry, &envelope) {
        Ok(Reply::Status(status)) => encode_status(status),
        Ok(Reply::Data(data)) => encode_data(&data).unwrap_or_else(|e| {
            error!("reply encoding failed: {e}");
            encode_status(ResponseType::Error)
        }),
        Err(e) => {
            warn!("request '{}' failed: {e}", envelope.request);
            encode_status(ResponseType::Error)
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn parse_instant(raw: &Option<String>) -> Result<Option<NaiveDateTime>, HandlerError> {
    Ok(raw.as_deref().map(str::parse).transpose()?)
}

fn data_reply(payload: impl serde::Serialize) -> Result<Reply, HandlerError> {
    Ok(Reply::Data(serde_json::to_value(payload)?))
}

fn handle_request(
    registry: &Mutex<Registry>,
    envelope: &RequestEnvelope,
) -> Result<Reply, HandlerError> {
    match envelope.request.as_str() {
        "setup_ground_station" => {
            let body: SetupGroundStationBody = envelope.body()?;
            lock(registry).setup_ground_station(
                body.longitude,
                body.latitude,
                body.altitude,
                body.elevation,
                &body.station_name,
            )?;
            Ok(Reply::Status(ResponseType::Configure))
        }

        "setup_satellite" => {
            let body: SetupSatelliteBody = envelope.body()?;
            lock(registry).setup_satellite(
                &body.station_name,
                body.norad_id,
                body.uplink,
                body.downlink,
            )?;
            Ok(Reply::Status(ResponseType::Configure))
        }

        "setup_comm" => {
            let body: CommKeyBody = envelope.body()?;
            lock(registry).setup_comm(&body.station_name, body.norad_id)?;
            Ok(Reply::Status(ResponseType::Configure))
        }

        "setup_new_frequencies" => {
            let body: NewFrequenciesBody = envelope.body()?;
            lock(registry).setup_new_frequencies(
                &body.station_name,
                body.norad_id,
                body.uplink,
                body.downlink,
            )?;
            Ok(Reply::Status(ResponseType::Configure))
        }

        "setup_new_tle_by_str" => {
            let body: TleByStrBody = envelope.body()?;
            lock(registry).setup_new_tle_by_str(&body.station_name, body.norad_id, &body.tle_str)?;
            Ok(Reply::Status(ResponseType::TleUpdate))
        }

        "setup_new_tle_by_file" => {
            let body: TleByFileBody = envelope.body()?;
            lock(registry).setup_new_tle_by_file(
                &body.station_name,
                body.norad_id,
                &body.tle_file_name,
                body.default_folder,
            )?;
            Ok(Reply::Status(ResponseType::TleUpdate))
        }

        "setup_new_tle_by_spacetrack" => {
            let body: CommKeyBody = envelope.body()?;
            lock(registry).setup_new_tle_by_source(&body.station_name, body.norad_id)?;
            Ok(Reply::Status(ResponseType::TleUpdate))
        }

        "update_tles_by_spacetrack" => {
            let body: UpdateTlesBody = envelope.body()?;
            lock(registry).update_tles_by_source(&body.station_name, &body.norad_ids)?;
            Ok(Reply::Status(ResponseType::TleUpdate))
        }

        "predict_comm" => {
            let body: PredictCommBody = envelope.body()?;
            let start = parse_instant(&body.start_prediction)?;
            lock(registry).predict_comm(
                &body.station_name,
                body.norad_id,
                start,
                body.time_prediction,
                body.step_prediction,
            )?;
            Ok(Reply::Status(ResponseType::Predict))
        }

        "get_setuped_stations" => {
            let registry = lock(registry);
            let stations: BTreeMap<String, StationInfo> = registry
                .stations()
                .iter()
                .map(|(name, station)| {
                    (
                        name.clone(),
                        StationInfo {
                            longitude: station.pos.lam.to_degrees(),
                            latitude: station.pos.phi.to_degrees(),
                            altitude: station.pos.alt,
                            elevation: station.min_elevation.to_degrees(),
                        },
                    )
                })
                .collect();
            data_reply(stations)
        }

        "get_station_satellites_info" => {
            let body: StationKeyBody = envelope.body()?;
            let registry = lock(registry);
            let info: BTreeMap<String, SatelliteInfo> = registry
                .station_satellites(&body.station_name)?
                .iter()
                .map(|(norad_id, satellite)| {
                    (
                        norad_id.to_string(),
                        SatelliteInfo {
                            uplink: satellite.uplink_freq,
                            downlink: satellite.downlink_freq,
                            tle_dt: satellite
                                .tle()
                                .map(|tle| tle.epoch.and_time(NaiveTime::MIN)),
                        },
                    )
                })
                .collect();
            data_reply(info)
        }

        "get_azimuth_elevation" => {
            let body: InstantQueryBody = envelope.body()?;
            let at = parse_instant(&body.dt)?;
            let (dt, azimuth, elevation) =
                lock(registry).get_azimuth_elevation(&body.station_name, body.norad_id, at)?;
            data_reply(DirectionReply {
                dt,
                azimuth,
                elevation,
            })
        }

        "get_frequencies" => {
            let body: InstantQueryBody = envelope.body()?;
            let at = parse_instant(&body.dt)?;
            let (dt, uplink, downlink) =
                lock(registry).get_frequencies(&body.station_name, body.norad_id, at)?;
            data_reply(FrequenciesReply {
                dt,
                uplink,
                downlink,
            })
        }

        "get_data" => {
            let body: InstantQueryBody = envelope.body()?;
            let at = parse_instant(&body.dt)?;
            let (dt, azimuth, elevation, uplink, downlink) =
                lock(registry).get_data(&body.station_name, body.norad_id, at)?;
            data_reply(PointReply {
                dt,
                azimuth,
                elevation,
                uplink,
                downlink,
            })
        }

        "get_comm_sessions_params" => {
            let body: CommKeyBody = envelope.body()?;
            let mut registry = lock(registry);
            let sessions = registry.get_comm_sessions_params(&body.station_name, body.norad_id)?;
            let data: BTreeMap<String, Value> = sessions
                .iter()
                .map(|(start, session)| {
                    Ok((
                        start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                        serde_json::to_value(session)?,
                    ))
                })
                .collect::<Result<_, serde_json::Error>>()?;
            data_reply(data)
        }

        "get_all_data" => {
            let body: CommKeyBody = envelope.body()?;
            let registry = lock(registry);
            let data: Vec<SamplePoint> = registry
                .get_all_data(&body.station_name, body.norad_id)?
                .iter()
                .map(|(instant, sample)| SamplePoint {
                    dt: *instant,
                    azimuth: sample.azimuth,
                    elevation: sample.elevation,
                    uplink: sample.uplink,
                    downlink: sample.downlink,
                    visibility: sample.visibility,
                })
                .collect();
            data_reply(data)
        }

        "clear_ground_station_data" => {
            let body: StationKeyBody = envelope.body()?;
            lock(registry).clear_ground_station_data(&body.station_name)?;
            Ok(Reply::Status(ResponseType::Configure))
        }

        _ => {
            warn!("unexpected request '{}'", envelope.request);
            Ok(Reply::Status(ResponseType::None))
        }
    }
}
