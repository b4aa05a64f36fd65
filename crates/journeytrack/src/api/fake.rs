//! In-memory [`FleetApi`] for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{
    ApiError, ApiResult, DeviceRecord, FleetApi, TelemetryEndpoint, TelemetryReading,
    VehicleRecord,
};

/// Scriptable fake of the upstream API.
#[derive(Debug, Default)]
pub struct FakeFleetApi {
    vehicles: Mutex<Vec<VehicleRecord>>,
    devices: Mutex<Vec<DeviceRecord>>,
    telemetry: Mutex<HashMap<(TelemetryEndpoint, String), Vec<TelemetryReading>>>,
    addresses: Mutex<HashMap<String, String>>,
    unhealthy: AtomicBool,
    offline: AtomicBool,
    list_failures_remaining: AtomicUsize,
    pub telemetry_calls: AtomicUsize,
    pub list_device_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
}

impl FakeFleetApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicle(self, vehicle: VehicleRecord) -> Self {
        self.vehicles.lock().unwrap().push(vehicle);
        self
    }

    pub fn with_device(self, device: DeviceRecord) -> Self {
        self.devices.lock().unwrap().push(device);
        self
    }

    pub fn set_telemetry(
        &self,
        endpoint: TelemetryEndpoint,
        device_id: &str,
        readings: Vec<TelemetryReading>,
    ) {
        self.telemetry
            .lock()
            .unwrap()
            .insert((endpoint, device_id.to_string()), readings);
    }

    pub fn clear_telemetry(&self) {
        self.telemetry.lock().unwrap().clear();
    }

    pub fn set_address(&self, latitude: f64, longitude: f64, address: &str) {
        self.addresses
            .lock()
            .unwrap()
            .insert(address_key(latitude, longitude), address.to_string());
    }

    /// Health probes fail while set.
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Every call fails with a connection error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `n` list calls fail before succeeding.
    pub fn fail_next_lists(&self, n: usize) {
        self.list_failures_remaining.store(n, Ordering::SeqCst);
    }

    fn check_online(&self) -> ApiResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Http("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_list(&self, path: &str) -> ApiResult<()> {
        self.check_online()?;
        let injected = self
            .list_failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ApiError::Status {
                status: 503,
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

fn address_key(latitude: f64, longitude: f64) -> String {
    format!("{latitude:.4},{longitude:.4}")
}

#[async_trait::async_trait]
impl FleetApi for FakeFleetApi {
    async fn list_vehicles(&self) -> ApiResult<Vec<VehicleRecord>> {
        self.check_list("/vehicles")?;
        Ok(self.vehicles.lock().unwrap().clone())
    }

    async fn vehicle(&self, vehicle_id: &str) -> ApiResult<VehicleRecord> {
        self.check_online()?;
        self.vehicles
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.id == vehicle_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("/vehicles/{vehicle_id}")))
    }

    async fn list_devices(&self) -> ApiResult<Vec<DeviceRecord>> {
        self.list_device_calls.fetch_add(1, Ordering::SeqCst);
        self.check_list("/devices")?;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn device(&self, device_id: &str) -> ApiResult<DeviceRecord> {
        self.check_online()?;
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("/devices/{device_id}")))
    }

    async fn telemetry(
        &self,
        endpoint: TelemetryEndpoint,
        device_id: &str,
    ) -> ApiResult<Vec<TelemetryReading>> {
        self.telemetry_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.telemetry
            .lock()
            .unwrap()
            .get(&(endpoint, device_id.to_string()))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(endpoint.path(device_id)))
    }

    async fn health(&self) -> ApiResult<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                path: "/health".to_string(),
            });
        }
        Ok(())
    }

    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> ApiResult<Option<String>> {
        self.check_online()?;
        Ok(self
            .addresses
            .lock()
            .unwrap()
            .get(&address_key(latitude, longitude))
            .cloned())
    }
}

/// A vehicle record with a device and a last-known position.
pub fn vehicle(id: &str, device_id: Option<&str>, position: Option<(f64, f64)>) -> VehicleRecord {
    VehicleRecord {
        id: id.to_string(),
        name: Some(format!("Vehicle {id}")),
        registration: None,
        device_id: device_id.map(str::to_string),
        latitude: position.map(|p| p.0),
        longitude: position.map(|p| p.1),
        speed: position.map(|_| 0.0),
        heading: None,
    }
}

/// A device record with an optional last-known position.
pub fn device(id: &str, vehicle_id: Option<&str>, position: Option<(f64, f64)>) -> DeviceRecord {
    DeviceRecord {
        id: id.to_string(),
        vehicle_id: vehicle_id.map(str::to_string),
        latitude: position.map(|p| p.0),
        longitude: position.map(|p| p.1),
        speed: position.map(|_| 0.0),
        heading: None,
        accuracy: None,
    }
}

/// A telemetry reading at a position and speed.
pub fn reading(latitude: f64, longitude: f64, speed: f64) -> TelemetryReading {
    TelemetryReading {
        latitude: Some(latitude),
        longitude: Some(longitude),
        speed: Some(speed),
        heading: Some(45.0),
        accuracy: Some(5.0),
    }
}
