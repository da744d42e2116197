//! Process bootstrap
//!
//! Assembles the running system from a validated [`Config`] in a fixed
//! order. Every stage either succeeds completely or aborts startup with an
//! error naming the failing subsystem; nothing is rolled back.
//!
//! 1. Environment: sponsorship, MQTT broker, scripting VMs
//! 2. Devices, load points and the site
//! 3. Telemetry pipeline, HEMS adapter and notification hub

use crate::cache::Cache;
use crate::config::{Config, InfluxConfig, MessagingConfig, TypedConfig, decode_other};
use crate::core::{LoadPoint, LoadPointConfig, Site};
use crate::devices::DeviceRegistry;
use crate::error::{Result, ResultExt, SeleneError};
use crate::hems::{self, Hems};
use crate::influx::InfluxWriter;
use crate::logging::get_logger;
use crate::mqtt::{self, MqttHandle};
use crate::pipe::{self, CHANNEL_CAPACITY, Deduplicator, Limiter, Sample, Tee};
use crate::push::{self, EVENT_CHANNEL_CAPACITY, Event, Hub};
use crate::scripting::{self, ScriptRuntime};
use crate::shutdown::ShutdownSignal;
use crate::sponsor::{self, AuthClient, Sponsorship};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Repeated `socCharge` values are suppressed for this long
pub const DEDUPLICATION_WINDOW: Duration = Duration::from_secs(30 * 60);

/// At most one value per source is written within this window
pub const LIMITER_WINDOW: Duration = Duration::from_secs(5);

/// Process-wide services shared by everything configured later
pub struct Environment {
    pub sponsorship: Sponsorship,
    pub mqtt: Option<MqttHandle>,
    pub scripts: Arc<ScriptRuntime>,
}

/// Verify sponsorship, connect MQTT and configure scripting, in that order
pub async fn configure_environment(config: &Config, shutdown: ShutdownSignal) -> Result<Environment> {
    let sponsorship = if config.sponsortoken.is_empty() {
        Sponsorship::unsponsored()
    } else {
        sponsor::configure_sponsorship(&config.sponsortoken).await?
    };

    configure_services(config, sponsorship, shutdown).await
}

/// Like [`configure_environment`], verifying the token through `auth`
pub async fn configure_environment_with(
    config: &Config,
    auth: &dyn AuthClient,
    shutdown: ShutdownSignal,
) -> Result<Environment> {
    let sponsorship = if config.sponsortoken.is_empty() {
        Sponsorship::unsponsored()
    } else {
        sponsor::verify(auth, &config.sponsortoken).await?
    };

    configure_services(config, sponsorship, shutdown).await
}

async fn configure_services(
    config: &Config,
    sponsorship: Sponsorship,
    shutdown: ShutdownSignal,
) -> Result<Environment> {
    let mqtt = if config.mqtt.broker.trim().is_empty() {
        None
    } else {
        Some(mqtt::configure_mqtt(&config.mqtt, shutdown).await?)
    };

    let scripts = scripting::configure(&config.javascript).context("failed configuring javascript")?;

    Ok(Environment {
        sponsorship,
        mqtt,
        scripts: Arc::new(scripts),
    })
}

/// Build the device registry, the load points and the site
pub fn configure_site_and_loadpoints(config: &Config, environment: &Environment) -> Result<Site> {
    let devices = DeviceRegistry::from_config(config, &environment.scripts)
        .context("failed configuring devices")?;
    let load_points = configure_load_points(config, &devices)?;

    Site::from_config(&config.site, &devices, load_points).context("failed configuring site")
}

/// One load point per `loadpoints[]` block, labelled `lp-1`, `lp-2`, …
pub fn configure_load_points(config: &Config, devices: &DeviceRegistry) -> Result<Vec<LoadPoint>> {
    let blocks = config
        .loadpoints
        .as_deref()
        .filter(|blocks| !blocks.is_empty())
        .ok_or_else(|| SeleneError::config("missing loadpoints"))?;

    let mut load_points = Vec::with_capacity(blocks.len());
    for (id, block) in blocks.iter().enumerate() {
        let lpc: LoadPointConfig =
            decode_other(block).context("failed decoding loadpoint configuration")?;

        let label = format!("lp-{}", id + 1);
        let lp = LoadPoint::from_config(&label, devices, lpc).context("failed configuring loadpoint")?;
        load_points.push(lp);
    }

    Ok(load_points)
}

/// Start the InfluxDB writer behind the deduplicator and rate limiter
pub fn configure_database(
    config: &InfluxConfig,
    load_points: &[LoadPoint],
    input: mpsc::Receiver<Sample>,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let writer = InfluxWriter::new(config).context("failed configuring influx")?;
    let titles = load_points.iter().map(|lp| lp.title().to_string()).collect();

    let input = pipe::pipe(
        Deduplicator::new(DEDUPLICATION_WINDOW, &["socCharge"]),
        input,
        shutdown.clone(),
    );
    let input = pipe::pipe(Limiter::new(LIMITER_WINDOW), input, shutdown.clone());

    tokio::spawn(writer.run(titles, input, shutdown));
    Ok(())
}

/// Build and start the configured HEMS adapter, if any
pub async fn configure_hems(
    config: &TypedConfig,
    site: &Site,
    cache: Cache,
    shutdown: ShutdownSignal,
) -> Result<Option<Box<dyn Hems>>> {
    let Some(adapter) = hems::new_from_config(config, site, cache).context("failed configuring hems")?
    else {
        return Ok(None);
    };

    adapter.start(shutdown).await.context("failed configuring hems")?;
    Ok(Some(adapter))
}

/// Start the notification hub; events are sent through the returned channel
pub fn configure_messengers(
    config: &MessagingConfig,
    cache: Cache,
    shutdown: ShutdownSignal,
) -> Result<mpsc::Sender<Event>> {
    for (name, template) in &config.events {
        push::validate_template(&template.title)
            .and_then(|_| push::validate_template(&template.msg))
            .context(format!("failed configuring messaging event {}", name))?;
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut hub = Hub::new(config.events.clone(), cache);

    for service in &config.services {
        let messenger = push::new_messenger_from_config(service)
            .context(format!("failed configuring messenger {}", service.kind))?;
        hub.add(messenger);
    }

    tokio::spawn(hub.run(rx, shutdown));
    Ok(tx)
}

/// Everything bootstrap produced
pub struct Runtime {
    pub environment: Environment,
    pub site: Arc<Site>,
    pub cache: Cache,
    pub values: mpsc::Sender<Sample>,
    pub events: mpsc::Sender<Event>,
    pub hems: Option<Box<dyn Hems>>,
}

impl Runtime {
    /// Start the site measurement loop
    pub fn spawn_site(&self, interval: Duration, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let site = Arc::clone(&self.site);
        let values = self.values.clone();
        let events = self.events.clone();
        tokio::spawn(async move { site.run(interval, values, Some(events), shutdown).await })
    }
}

/// Run the complete bootstrap sequence
pub async fn bootstrap(config: &Config, shutdown: ShutdownSignal) -> Result<Runtime> {
    let environment = configure_environment(config, shutdown.clone()).await?;
    assemble(config, environment, shutdown).await
}

/// Assemble site, telemetry, HEMS and messaging on top of an environment
pub async fn assemble(
    config: &Config,
    environment: Environment,
    shutdown: ShutdownSignal,
) -> Result<Runtime> {
    let logger = get_logger("setup");
    let site = configure_site_and_loadpoints(config, &environment)?;

    let cache = Cache::new();
    let (values, input) = mpsc::channel(CHANNEL_CAPACITY);
    let mut input = pipe::pipe(cache.clone(), input, shutdown.clone());

    if let Some(handle) = &environment.mqtt {
        let (side, published) = mpsc::channel(CHANNEL_CAPACITY);
        input = pipe::pipe(Tee::new(side), input, shutdown.clone());
        tokio::spawn(mqtt::run_publisher(
            handle.clone(),
            config.mqtt.root_topic().to_string(),
            published,
            shutdown.clone(),
        ));
    }

    if config.influx.enabled() {
        configure_database(&config.influx, site.load_points(), input, shutdown.clone())?;
    } else {
        tokio::spawn(drain(input));
    }

    let hems = configure_hems(&config.hems, &site, cache.clone(), shutdown.clone()).await?;
    let events = configure_messengers(&config.messaging, cache.clone(), shutdown)?;

    logger.info(&format!(
        "site {} ready with {} loadpoint(s)",
        site.title(),
        site.load_points().len()
    ));

    Ok(Runtime {
        environment,
        site: Arc::new(site),
        cache,
        values,
        events,
        hems,
    })
}

async fn drain(mut input: mpsc::Receiver<Sample>) {
    while input.recv().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sponsor::{AuthRequest, AuthResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubAuth {
        calls: AtomicUsize,
        response: Option<AuthResponse>,
    }

    impl StubAuth {
        fn new(response: Option<AuthResponse>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response,
            }
        }
    }

    #[async_trait::async_trait]
    impl AuthClient for StubAuth {
        async fn is_authorized(&self, _request: AuthRequest) -> Result<AuthResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .ok_or_else(|| SeleneError::network("connection refused"))
        }
    }

    fn config(yaml: &str) -> Config {
        Config::from_yaml(yaml).unwrap()
    }

    #[tokio::test]
    async fn empty_token_makes_no_remote_call() {
        let auth = StubAuth::new(None);
        let env = configure_environment_with(&config("interval: 10"), &auth, ShutdownSignal::new())
            .await
            .unwrap();

        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
        assert!(!env.sponsorship.is_sponsored());
        assert!(env.mqtt.is_none());
    }

    #[tokio::test]
    async fn authorized_token_records_subject() {
        let auth = StubAuth::new(Some(AuthResponse {
            authorized: true,
            subject: "alice".to_string(),
        }));
        let env = configure_environment_with(&config("sponsortoken: t"), &auth, ShutdownSignal::new())
            .await
            .unwrap();
        assert_eq!(env.sponsorship.subject(), Some("alice"));
    }

    #[tokio::test]
    async fn unauthorized_token_is_silently_ignored() {
        let auth = StubAuth::new(Some(AuthResponse {
            authorized: false,
            subject: "alice".to_string(),
        }));
        let env = configure_environment_with(&config("sponsortoken: t"), &auth, ShutdownSignal::new())
            .await
            .unwrap();
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(env.sponsorship.subject(), None);
    }

    #[tokio::test]
    async fn sponsorship_failure_stops_the_chain() {
        let auth = StubAuth::new(None);
        // A broken script would fail later; the sponsorship error must win
        let cfg = config("sponsortoken: t\njavascript:\n  - vm: x\n    script: 'let = ;'\n");
        let err = configure_environment_with(&cfg, &auth, ShutdownSignal::new())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("sponsortoken: "));
    }

    #[tokio::test]
    async fn script_failure_is_wrapped() {
        let cfg = config("javascript:\n  - vm: x\n    script: 'let = ;'\n");
        let err = configure_environment_with(&cfg, &StubAuth::new(None), ShutdownSignal::new())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("failed configuring javascript: vm x: "));
    }

    const DEVICES: &str = r#"
site:
  meters:
    grid: grid
meters:
  - name: grid
    type: demo
    power: 100
chargers:
  - name: wb1
    type: demo
  - name: wb2
    type: demo
"#;

    fn environment() -> Environment {
        Environment {
            sponsorship: Sponsorship::unsponsored(),
            mqtt: None,
            scripts: Arc::new(ScriptRuntime::new()),
        }
    }

    #[test]
    fn load_points_are_labelled_in_order() {
        let cfg = config(&format!(
            "{}loadpoints:\n  - title: Left\n    charger: wb1\n  - charger: wb2\n",
            DEVICES
        ));
        let site = configure_site_and_loadpoints(&cfg, &environment()).unwrap();

        let labels: Vec<&str> = site.load_points().iter().map(|lp| lp.label()).collect();
        assert_eq!(labels, vec!["lp-1", "lp-2"]);
        assert_eq!(site.load_point_titles(), vec!["Left", "lp-2"]);
    }

    #[test]
    fn missing_or_empty_load_points_fail() {
        for suffix in ["", "loadpoints: []\n"] {
            let cfg = config(&format!("{}{}", DEVICES, suffix));
            let err = configure_site_and_loadpoints(&cfg, &environment()).err().unwrap();
            assert!(err.to_string().contains("missing loadpoints"), "{}", err);
        }
    }

    #[test]
    fn load_point_failures_name_the_stage() {
        let cfg = config(&format!("{}loadpoints:\n  - charger: wb1\n    bogus: 1\n", DEVICES));
        let err = configure_site_and_loadpoints(&cfg, &environment()).err().unwrap();
        assert!(err.to_string().starts_with("failed decoding loadpoint configuration: "));

        let cfg = config(&format!("{}loadpoints:\n  - charger: wb1\n  - charger: nope\n", DEVICES));
        let err = configure_site_and_loadpoints(&cfg, &environment()).err().unwrap();
        assert!(err.to_string().starts_with("failed configuring loadpoint: "));
    }

    #[test]
    fn site_failure_is_wrapped() {
        let cfg = config(
            "meters:\n  - name: grid\n    type: demo\nchargers:\n  - name: wb1\n    type: demo\nloadpoints:\n  - charger: wb1\n",
        );
        let err = configure_site_and_loadpoints(&cfg, &environment()).err().unwrap();
        assert!(err.to_string().starts_with("failed configuring site: "));
    }

    #[tokio::test]
    async fn messenger_failure_names_the_type() {
        let cfg = config("messaging:\n  services:\n    - type: pushover\n");
        let err = configure_messengers(&cfg.messaging, Cache::new(), ShutdownSignal::new())
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("failed configuring messenger pushover: "));
    }

    #[tokio::test]
    async fn broken_event_template_fails_at_startup() {
        let cfg = config(
            "messaging:\n  events:\n    start:\n      title: Started\n      msg: '${socCharge:%.99999999f}'\n",
        );
        let err = configure_messengers(&cfg.messaging, Cache::new(), ShutdownSignal::new())
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("failed configuring messaging event start: "));
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn unknown_hems_type_fails() {
        let cfg = config(&format!(
            "{}loadpoints:\n  - charger: wb1\nhems:\n  type: eebus\n",
            DEVICES
        ));
        let site = configure_site_and_loadpoints(&cfg, &environment()).unwrap();
        let err = configure_hems(&cfg.hems, &site, Cache::new(), ShutdownSignal::new())
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "failed configuring hems: Configuration error: unknown type: eebus"
        );
    }

    #[tokio::test]
    async fn assemble_wires_values_into_the_cache() {
        let cfg = config(&format!("{}loadpoints:\n  - charger: wb1\n", DEVICES));
        let shutdown = ShutdownSignal::new();
        let runtime = assemble(&cfg, environment(), shutdown.clone()).await.unwrap();
        assert!(runtime.hems.is_none());

        runtime.site.update(&runtime.values, None).await;
        tokio::time::timeout(Duration::from_secs(1), async {
            while runtime.cache.lookup(None, "gridPower").is_none() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(runtime.cache.lookup(None, "gridPower"), Some(100.0));

        shutdown.trigger();
    }
}
