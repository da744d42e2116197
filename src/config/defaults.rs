use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/selene.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Home".to_string(),
            meters: SiteMetersConfig::default(),
            residual_power: 0.0,
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            vm: "default".to_string(),
            script: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: 10,
            logging: LoggingConfig::default(),
            site: SiteConfig::default(),
            loadpoints: None,
            meters: Vec::new(),
            chargers: Vec::new(),
            vehicles: Vec::new(),
            mqtt: MqttConfig::default(),
            javascript: Vec::new(),
            sponsortoken: String::new(),
            influx: InfluxConfig::default(),
            hems: TypedConfig::default(),
            messaging: MessagingConfig::default(),
        }
    }
}
