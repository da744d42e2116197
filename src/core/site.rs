use super::LoadPoint;
use super::loadpoint::publish;
use crate::api::Meter;
use crate::config::SiteConfig;
use crate::devices::DeviceRegistry;
use crate::error::{Result, SeleneError};
use crate::logging::{StructuredLogger, get_logger};
use crate::pipe::Sample;
use crate::push::Event;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// The grid connection and everything charging behind it
pub struct Site {
    title: String,
    grid_meter: Arc<dyn Meter>,
    pv_meters: Vec<Arc<dyn Meter>>,
    battery_meter: Option<Arc<dyn Meter>>,
    load_points: Vec<LoadPoint>,
    logger: StructuredLogger,
}

impl Site {
    pub fn from_config(
        config: &SiteConfig,
        devices: &DeviceRegistry,
        load_points: Vec<LoadPoint>,
    ) -> Result<Self> {
        if load_points.is_empty() {
            return Err(SeleneError::config("site requires at least one loadpoint"));
        }

        let grid = config
            .meters
            .grid
            .as_deref()
            .ok_or_else(|| SeleneError::config("missing grid meter"))?;
        let grid_meter = devices.meter(grid)?;

        let pv_meters = config
            .meters
            .pv
            .iter()
            .map(|name| devices.meter(name))
            .collect::<Result<Vec<_>>>()?;

        let battery_meter = config
            .meters
            .battery
            .as_deref()
            .map(|name| devices.meter(name))
            .transpose()?;

        let logger = get_logger("site");
        logger.info(&format!(
            "site {}: {} loadpoint(s), {} pv meter(s)",
            config.title,
            load_points.len(),
            pv_meters.len()
        ));

        Ok(Self {
            title: config.title.clone(),
            grid_meter,
            pv_meters,
            battery_meter,
            load_points,
            logger,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn load_points(&self) -> &[LoadPoint] {
        &self.load_points
    }

    /// Load point titles by index
    pub fn load_point_titles(&self) -> Vec<String> {
        self.load_points.iter().map(|lp| lp.title().to_string()).collect()
    }

    /// One measurement cycle over the site meters and all load points
    pub async fn update(&self, values: &mpsc::Sender<Sample>, events: Option<&mpsc::Sender<Event>>) {
        match self.grid_meter.current_power().await {
            Ok(power) => publish(values, None, "gridPower", power).await,
            Err(e) => self.logger.error(&format!("grid meter: {}", e)),
        }

        if !self.pv_meters.is_empty() {
            let mut total = 0.0;
            let mut failed = false;
            for meter in &self.pv_meters {
                match meter.current_power().await {
                    Ok(power) => total += power,
                    Err(e) => {
                        self.logger.error(&format!("pv meter: {}", e));
                        failed = true;
                    }
                }
            }
            if !failed {
                publish(values, None, "pvPower", total).await;
            }
        }

        if let Some(meter) = &self.battery_meter {
            match meter.current_power().await {
                Ok(power) => publish(values, None, "batteryPower", power).await,
                Err(e) => self.logger.error(&format!("battery meter: {}", e)),
            }
        }

        for (index, lp) in self.load_points.iter().enumerate() {
            lp.update(index, values, events).await;
        }
    }

    /// Measure every `interval` until shutdown
    pub async fn run(
        &self,
        interval: Duration,
        values: mpsc::Sender<Sample>,
        events: Option<mpsc::Sender<Event>>,
        shutdown: ShutdownSignal,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    self.logger.info("stopped");
                    break;
                }
                _ = ticker.tick() => self.update(&values, events.as_ref()).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChargeStatus;
    use crate::config::{SiteMetersConfig, decode_other};
    use crate::devices::demo::{DemoCharger, DemoMeter};

    fn registry() -> DeviceRegistry {
        let mut devices = DeviceRegistry::new();
        devices
            .add_charger("wb", Arc::new(DemoCharger::new(ChargeStatus::B, None)))
            .unwrap();
        devices
            .add_meter("grid", Arc::new(DemoMeter::new(-2000.0)))
            .unwrap();
        devices
            .add_meter("roof", Arc::new(DemoMeter::new(3000.0)))
            .unwrap();
        devices
            .add_meter("garage", Arc::new(DemoMeter::new(1000.0)))
            .unwrap();
        devices
    }

    fn site_config(grid: Option<&str>, pv: &[&str]) -> SiteConfig {
        SiteConfig {
            meters: SiteMetersConfig {
                grid: grid.map(str::to_string),
                pv: pv.iter().map(|s| s.to_string()).collect(),
                battery: None,
            },
            ..Default::default()
        }
    }

    fn load_point(devices: &DeviceRegistry) -> LoadPoint {
        let block = decode_other(&serde_yaml::from_str("charger: wb").unwrap()).unwrap();
        LoadPoint::from_config("lp-1", devices, block).unwrap()
    }

    #[test]
    fn requires_load_points_and_grid_meter() {
        let devices = registry();
        assert!(Site::from_config(&site_config(Some("grid"), &[]), &devices, vec![]).is_err());

        let err = Site::from_config(&site_config(None, &[]), &devices, vec![load_point(&devices)])
            .err()
            .unwrap();
        assert!(err.to_string().contains("missing grid meter"));

        assert!(
            Site::from_config(
                &site_config(Some("grid"), &["attic"]),
                &devices,
                vec![load_point(&devices)]
            )
            .is_err()
        );
    }

    #[tokio::test]
    async fn update_sums_pv_meters() {
        let devices = registry();
        let site = Site::from_config(
            &site_config(Some("grid"), &["roof", "garage"]),
            &devices,
            vec![load_point(&devices)],
        )
        .unwrap();
        assert_eq!(site.load_point_titles(), vec!["lp-1".to_string()]);

        let (tx, mut rx) = mpsc::channel(16);
        site.update(&tx, None).await;
        drop(tx);

        let mut site_values = std::collections::HashMap::new();
        while let Some(s) = rx.recv().await {
            if s.loadpoint.is_none() {
                site_values.insert(s.key, s.value);
            }
        }
        assert_eq!(site_values.get("gridPower"), Some(&-2000.0));
        assert_eq!(site_values.get("pvPower"), Some(&4000.0));
    }

    #[tokio::test]
    async fn run_measures_until_shutdown() {
        let devices = registry();
        let site = Arc::new(
            Site::from_config(&site_config(Some("grid"), &[]), &devices, vec![load_point(&devices)])
                .unwrap(),
        );

        let shutdown = ShutdownSignal::new();
        let (tx, mut rx) = mpsc::channel(64);
        let task = {
            let site = site.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { site.run(Duration::from_millis(10), tx, None, shutdown).await })
        };

        assert!(rx.recv().await.is_some());
        shutdown.trigger();
        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
