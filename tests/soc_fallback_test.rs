use selene::api::{Battery, ChargeStatus, Charger, Vehicle};
use selene::core::ChargeProgress;
use selene::devices::demo::{DemoCharger, DemoVehicle};
use selene::error::{Result, SeleneError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Charger whose cable SoC reading always fails
struct BrokenCableCharger;

#[async_trait::async_trait]
impl Charger for BrokenCableCharger {
    async fn status(&self) -> Result<ChargeStatus> {
        Ok(ChargeStatus::C)
    }

    fn battery(&self) -> Option<&dyn Battery> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Battery for BrokenCableCharger {
    async fn soc(&self) -> Result<f64> {
        Err(SeleneError::device("E"))
    }
}

fn vehicle(soc: Option<f64>) -> Option<Arc<dyn Vehicle>> {
    Some(Arc::new(DemoVehicle::new("ID.3", 58.0, soc)))
}

/// Vehicle that records every battery read
#[derive(Default)]
struct WatchedVehicle {
    reads: AtomicUsize,
}

impl Vehicle for WatchedVehicle {
    fn title(&self) -> &str {
        "watched"
    }

    fn capacity(&self) -> f64 {
        58.0
    }

    fn battery(&self) -> Option<&dyn Battery> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Battery for WatchedVehicle {
    async fn soc(&self) -> Result<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(42.0)
    }
}

#[tokio::test]
async fn charger_reading_wins_without_asking_the_vehicle() {
    let charger = Arc::new(DemoCharger::new(ChargeStatus::C, Some(55.0)));
    let car = Arc::new(WatchedVehicle::default());
    let progress = ChargeProgress::new(charger, Some(car.clone() as Arc<dyn Vehicle>));

    assert_eq!(progress.soc().await.unwrap(), 55.0);
    assert_eq!(car.reads.load(Ordering::SeqCst), 0);

    // Without a cable reading the same vehicle is asked exactly once
    let cableless = ChargeProgress::new(
        Arc::new(DemoCharger::new(ChargeStatus::C, None)),
        Some(car.clone() as Arc<dyn Vehicle>),
    );
    assert_eq!(cableless.soc().await.unwrap(), 42.0);
    assert_eq!(car.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn vehicle_is_asked_when_charger_cannot_tell() {
    let charger = Arc::new(DemoCharger::new(ChargeStatus::C, None));
    let progress = ChargeProgress::new(charger, vehicle(Some(42.0)));
    assert_eq!(progress.soc().await.unwrap(), 42.0);
}

#[tokio::test]
async fn charger_failures_are_not_masked() {
    let progress = ChargeProgress::new(Arc::new(BrokenCableCharger), vehicle(Some(42.0)));
    let err = progress.soc().await.unwrap_err();
    assert!(!err.is_not_available());
    assert_eq!(err.to_string(), "Device error: E");
}

#[tokio::test]
async fn no_source_means_not_available() {
    let charger = Arc::new(DemoCharger::new(ChargeStatus::B, None));
    let progress = ChargeProgress::new(charger, None);
    assert!(progress.soc().await.unwrap_err().is_not_available());

    progress.set_vehicle(vehicle(None));
    assert!(progress.soc().await.unwrap_err().is_not_available());

    progress.set_vehicle(vehicle(Some(80.0)));
    assert_eq!(progress.soc().await.unwrap(), 80.0);
}
