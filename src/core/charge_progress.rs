use crate::api::{Charger, Vehicle};
use crate::error::{Result, SeleneError};
use std::sync::{Arc, RwLock};

/// State of charge of the connected vehicle
///
/// Asks the charger first, then the vehicle. A source that lacks the
/// battery capability, or reports [`SeleneError::NotAvailable`], hands over
/// to the next one. Any other charger error is returned as is.
pub struct ChargeProgress {
    charger: Arc<dyn Charger>,
    vehicle: RwLock<Option<Arc<dyn Vehicle>>>,
}

impl ChargeProgress {
    pub fn new(charger: Arc<dyn Charger>, vehicle: Option<Arc<dyn Vehicle>>) -> Self {
        Self {
            charger,
            vehicle: RwLock::new(vehicle),
        }
    }

    /// Replace the vehicle used as fallback source
    pub fn set_vehicle(&self, vehicle: Option<Arc<dyn Vehicle>>) {
        if let Ok(mut current) = self.vehicle.write() {
            *current = vehicle;
        }
    }

    pub fn vehicle(&self) -> Option<Arc<dyn Vehicle>> {
        self.vehicle.read().ok().and_then(|v| v.clone())
    }

    pub async fn soc(&self) -> Result<f64> {
        let res = match self.charger.battery() {
            Some(battery) => battery.soc().await,
            None => Err(SeleneError::NotAvailable),
        };

        match res {
            Err(e) if e.is_not_available() => {}
            other => return other,
        }

        let vehicle = self.vehicle();
        match vehicle.as_ref().and_then(|v| v.battery()) {
            Some(battery) => battery.soc().await,
            None => Err(SeleneError::NotAvailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Battery, ChargeStatus};
    use crate::devices::demo::{DemoCharger, DemoVehicle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FaultyCharger;

    #[async_trait::async_trait]
    impl Charger for FaultyCharger {
        async fn status(&self) -> Result<ChargeStatus> {
            Ok(ChargeStatus::B)
        }

        fn battery(&self) -> Option<&dyn Battery> {
            Some(self)
        }
    }

    #[async_trait::async_trait]
    impl Battery for FaultyCharger {
        async fn soc(&self) -> Result<f64> {
            Err(SeleneError::device("E"))
        }
    }

    struct NoBatteryVehicle;

    impl Vehicle for NoBatteryVehicle {
        fn title(&self) -> &str {
            "plain"
        }
        fn capacity(&self) -> f64 {
            40.0
        }
    }

    struct FaultyVehicle;

    impl Vehicle for FaultyVehicle {
        fn title(&self) -> &str {
            "faulty"
        }
        fn capacity(&self) -> f64 {
            40.0
        }
        fn battery(&self) -> Option<&dyn Battery> {
            Some(self)
        }
    }

    #[async_trait::async_trait]
    impl Battery for FaultyVehicle {
        async fn soc(&self) -> Result<f64> {
            Err(SeleneError::api("E"))
        }
    }

    fn vehicle(soc: Option<f64>) -> Option<Arc<dyn Vehicle>> {
        Some(Arc::new(DemoVehicle::new("car", 50.0, soc)))
    }

    /// Vehicle counting how often its battery is read
    #[derive(Default)]
    struct CountingVehicle {
        reads: AtomicUsize,
    }

    impl Vehicle for CountingVehicle {
        fn title(&self) -> &str {
            "counting"
        }
        fn capacity(&self) -> f64 {
            40.0
        }
        fn battery(&self) -> Option<&dyn Battery> {
            Some(self)
        }
    }

    #[async_trait::async_trait]
    impl Battery for CountingVehicle {
        async fn soc(&self) -> Result<f64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(42.0)
        }
    }

    #[tokio::test]
    async fn charger_soc_wins() {
        let car = Arc::new(CountingVehicle::default());
        let cp = ChargeProgress::new(
            Arc::new(DemoCharger::new(ChargeStatus::C, Some(55.0))),
            Some(car.clone() as Arc<dyn Vehicle>),
        );
        assert_eq!(cp.soc().await.unwrap(), 55.0);
        assert_eq!(car.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_vehicle() {
        let cp = ChargeProgress::new(
            Arc::new(DemoCharger::new(ChargeStatus::C, None)),
            vehicle(Some(42.0)),
        );
        assert_eq!(cp.soc().await.unwrap(), 42.0);
    }

    #[tokio::test]
    async fn charger_error_is_not_masked() {
        let cp = ChargeProgress::new(Arc::new(FaultyCharger), vehicle(Some(42.0)));
        let err = cp.soc().await.unwrap_err();
        assert_eq!(err.to_string(), "Device error: E");
    }

    #[tokio::test]
    async fn vehicle_error_after_fallback_is_returned() {
        let cp = ChargeProgress::new(
            Arc::new(DemoCharger::new(ChargeStatus::C, None)),
            Some(Arc::new(FaultyVehicle)),
        );
        let err = cp.soc().await.unwrap_err();
        assert_eq!(err.to_string(), "API error: E");
    }

    #[tokio::test]
    async fn neither_source_is_not_available() {
        let charger: Arc<dyn Charger> = Arc::new(DemoCharger::new(ChargeStatus::B, None));

        let cp = ChargeProgress::new(charger.clone(), None);
        assert!(cp.soc().await.unwrap_err().is_not_available());

        cp.set_vehicle(Some(Arc::new(NoBatteryVehicle)));
        assert!(cp.soc().await.unwrap_err().is_not_available());

        cp.set_vehicle(vehicle(Some(70.0)));
        assert_eq!(cp.soc().await.unwrap(), 70.0);
    }
}
