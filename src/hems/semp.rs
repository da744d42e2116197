//! SMA SEMP adapter
//!
//! Serves each load point as an EV charger device to a Sunny Home Manager.
//! `GET /semp/` returns the Device2EM document, `POST /semp/` receives
//! EM2Device control messages. Recommendations are only recorded when
//! `allowcontrol` is set.

use super::Hems;
use crate::cache::Cache;
use crate::config::TypedConfig;
use crate::core::Site;
use crate::error::{Result, SeleneError};
use crate::logging::{StructuredLogger, get_logger};
use crate::shutdown::ShutdownSignal;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;

const SEMP_NAMESPACE: &str = "http://www.sma.de/communication/schema/SEMP/v1";
const DEFAULT_VENDOR_ID: &str = "53454c45";
const AVERAGING_INTERVAL: u32 = 60;

fn default_listen() -> String {
    "0.0.0.0:7090".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SempConfig {
    #[serde(default)]
    allowcontrol: bool,
    #[serde(default = "default_listen")]
    listen: String,
    #[serde(default)]
    vendorid: Option<String>,
}

/// One load point as seen by the energy manager
#[derive(Debug, Clone, PartialEq)]
pub struct SempDevice {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub min_power: f64,
    pub max_power: f64,
}

/// Last control message for a device
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub on: bool,
    pub power: f64,
}

#[derive(Clone)]
pub struct SempState {
    devices: Arc<Vec<SempDevice>>,
    cache: Cache,
    allow_control: bool,
    recommendations: Arc<Mutex<HashMap<String, Recommendation>>>,
    logger: StructuredLogger,
}

impl SempState {
    pub fn recommendation(&self, device_id: &str) -> Option<Recommendation> {
        self.recommendations.lock().ok()?.get(device_id).cloned()
    }
}

pub struct Semp {
    listen: String,
    state: SempState,
}

impl Semp {
    pub fn from_config(cfg: &TypedConfig, site: &Site, cache: Cache) -> Result<Self> {
        let cc: SempConfig = cfg.decode()?;

        let vendor = cc.vendorid.unwrap_or_else(|| DEFAULT_VENDOR_ID.to_string());
        if vendor.len() != 8 || !vendor.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SeleneError::validation(
                "vendorid".to_string(),
                format!("Must be 8 hex digits, got {}", vendor),
            ));
        }

        let devices = site
            .load_points()
            .iter()
            .enumerate()
            .map(|(index, lp)| {
                let phases = f64::from(lp.phases());
                SempDevice {
                    index,
                    id: device_id(&vendor, site.title(), index),
                    name: lp.title().to_string(),
                    min_power: lp.min_current() * phases * crate::core::NOMINAL_VOLTAGE,
                    max_power: lp.max_power(),
                }
            })
            .collect();

        Ok(Self::new(&cc.listen, devices, cache, cc.allowcontrol))
    }

    pub fn new(listen: &str, devices: Vec<SempDevice>, cache: Cache, allow_control: bool) -> Self {
        Self {
            listen: listen.to_string(),
            state: SempState {
                devices: Arc::new(devices),
                cache,
                allow_control,
                recommendations: Arc::new(Mutex::new(HashMap::new())),
                logger: get_logger("semp"),
            },
        }
    }

    pub fn devices(&self) -> &[SempDevice] {
        &self.state.devices
    }

    pub fn state(&self) -> SempState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/semp", get(device_info).post(control))
            .route("/semp/", get(device_info).post(control))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait::async_trait]
impl Hems for Semp {
    fn name(&self) -> &'static str {
        "semp"
    }

    async fn start(&self, shutdown: ShutdownSignal) -> Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(self.listen.as_str())
            .await
            .map_err(|e| SeleneError::network(format!("bind {}: {}", self.listen, e)))?;
        let addr = listener.local_addr()?;

        let router = self.router();
        let logger = self.state.logger.clone();
        logger.info(&format!("listening on {}", addr));

        tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await;
            if let Err(e) = served {
                logger.error(&format!("server: {}", e));
            }
        });

        Ok(addr)
    }
}

/// `F-<vendor>-<serial>-00`, stable for a given site and load point
fn device_id(vendor: &str, site: &str, index: usize) -> String {
    let mut hasher = DefaultHasher::new();
    site.hash(&mut hasher);
    index.hash(&mut hasher);
    format!(
        "F-{}-{:012X}-00",
        vendor.to_uppercase(),
        hasher.finish() & 0xFFFF_FFFF_FFFF
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the Device2EM document for the current cache state
pub fn device_document(state: &SempState) -> String {
    let mut infos = String::new();
    let mut statuses = String::new();

    for dev in state.devices.iter() {
        let lp = Some(dev.index);
        let charging = state.cache.lookup(lp, "charging") == Some(1.0);
        let connected = state.cache.lookup(lp, "connected") == Some(1.0);
        let power = state.cache.lookup(lp, "chargePower").unwrap_or(0.0);

        infos.push_str(&format!(
            "<DeviceInfo>\
<Identification><DeviceId>{id}</DeviceId><DeviceName>{name}</DeviceName>\
<DeviceType>EVCharger</DeviceType><DeviceSerial>{index}</DeviceSerial><DeviceVendor>selene</DeviceVendor></Identification>\
<Characteristics><MinPowerConsumption>{min:.0}</MinPowerConsumption><MaxPowerConsumption>{max:.0}</MaxPowerConsumption></Characteristics>\
<Capabilities><CurrentPower><Method>Measurement</Method></CurrentPower>\
<Interruptions><InterruptionsAllowed>true</InterruptionsAllowed></Interruptions></Capabilities>\
</DeviceInfo>",
            id = dev.id,
            name = escape_xml(&dev.name),
            index = dev.index + 1,
            min = dev.min_power,
            max = dev.max_power,
        ));

        statuses.push_str(&format!(
            "<DeviceStatus><DeviceId>{id}</DeviceId>\
<EMSignalsAccepted>{accepted}</EMSignalsAccepted><Status>{status}</Status>\
<PowerConsumption><PowerInfo><AveragePower>{power:.0}</AveragePower>\
<AveragingInterval>{interval}</AveragingInterval></PowerInfo></PowerConsumption>\
</DeviceStatus>",
            id = dev.id,
            accepted = state.allow_control && connected,
            status = if charging { "On" } else { "Off" },
            power = power,
            interval = AVERAGING_INTERVAL,
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Device2EM xmlns=\"{}\">{}{}</Device2EM>",
        SEMP_NAMESPACE, infos, statuses
    )
}

async fn device_info(State(state): State<SempState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        device_document(&state),
    )
}

/// Text content of every `<tag>…</tag>` element
fn tag_values<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        values.push(after[..end].trim());
        rest = &after[end + close.len()..];
    }
    values
}

async fn control(State(state): State<SempState>, body: String) -> impl IntoResponse {
    let controls = tag_values(&body, "DeviceControl");
    if controls.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    for ctrl in controls {
        let Some(id) = tag_values(ctrl, "DeviceId").first().copied() else {
            return StatusCode::BAD_REQUEST;
        };
        if !state.devices.iter().any(|d| d.id == id) {
            state.logger.warn(&format!("control for unknown device {}", id));
            continue;
        }

        let on = tag_values(ctrl, "On").first().is_some_and(|v| *v == "true");
        let power = tag_values(ctrl, "RecommendedPowerConsumption")
            .first()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);

        if !state.allow_control {
            state
                .logger
                .debug(&format!("ignoring control for {}: on={} power={}", id, on, power));
            continue;
        }

        state
            .logger
            .info(&format!("recommendation for {}: on={} power={}", id, on, power));
        if let Ok(mut recommendations) = state.recommendations.lock() {
            recommendations.insert(id.to_string(), Recommendation { on, power });
        }
    }

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Sample;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn devices() -> Vec<SempDevice> {
        vec![SempDevice {
            index: 0,
            id: device_id(DEFAULT_VENDOR_ID, "Home", 0),
            name: "Garage & Carport".to_string(),
            min_power: 4140.0,
            max_power: 11040.0,
        }]
    }

    #[test]
    fn device_ids_are_stable_and_well_formed() {
        let id = device_id(DEFAULT_VENDOR_ID, "Home", 0);
        assert_eq!(id, device_id(DEFAULT_VENDOR_ID, "Home", 0));
        assert_ne!(id, device_id(DEFAULT_VENDOR_ID, "Home", 1));
        assert!(id.starts_with("F-53454C45-"));
        assert!(id.ends_with("-00"));
        assert_eq!(id.len(), 2 + 8 + 1 + 12 + 3);
    }

    #[tokio::test]
    async fn get_reports_cached_status() {
        let cache = Cache::new();
        cache.add(&Sample::new(Some(0), "charging", 1.0));
        cache.add(&Sample::new(Some(0), "connected", 1.0));
        cache.add(&Sample::new(Some(0), "chargePower", 7360.4));
        let semp = Semp::new("127.0.0.1:0", devices(), cache, true);

        let response = semp
            .router()
            .oneshot(Request::builder().uri("/semp/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let xml = String::from_utf8(body.to_vec()).unwrap();
        assert!(xml.contains("<DeviceName>Garage &amp; Carport</DeviceName>"));
        assert!(xml.contains("<Status>On</Status>"));
        assert!(xml.contains("<EMSignalsAccepted>true</EMSignalsAccepted>"));
        assert!(xml.contains("<AveragePower>7360</AveragePower>"));
        assert!(xml.contains("<MaxPowerConsumption>11040</MaxPowerConsumption>"));
    }

    fn control_body(id: &str) -> String {
        format!(
            "<EM2Device xmlns=\"{}\"><DeviceControl><DeviceId>{}</DeviceId><On>true</On>\
<RecommendedPowerConsumption>4200</RecommendedPowerConsumption></DeviceControl></EM2Device>",
            SEMP_NAMESPACE, id
        )
    }

    async fn post(semp: &Semp, body: String) -> StatusCode {
        semp.router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/semp/")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn control_is_recorded_only_when_allowed() {
        let id = devices()[0].id.clone();

        let denied = Semp::new("127.0.0.1:0", devices(), Cache::new(), false);
        assert_eq!(post(&denied, control_body(&id)).await, StatusCode::OK);
        assert!(denied.state().recommendation(&id).is_none());

        let allowed = Semp::new("127.0.0.1:0", devices(), Cache::new(), true);
        assert_eq!(post(&allowed, control_body(&id)).await, StatusCode::OK);
        assert_eq!(
            allowed.state().recommendation(&id),
            Some(Recommendation {
                on: true,
                power: 4200.0
            })
        );

        assert_eq!(post(&allowed, "garbage".to_string()).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_binds_and_stops() {
        let semp = Semp::new("127.0.0.1:0", devices(), Cache::new(), false);
        let shutdown = ShutdownSignal::new();
        let addr = semp.start(shutdown.clone()).await.unwrap();
        assert_ne!(addr.port(), 0);
        shutdown.trigger();
    }
}
