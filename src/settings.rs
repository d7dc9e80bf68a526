use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use config::Config;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::{
    alertmanager_webhook_receiver::AlertReceiverSettings, dispatcher::RemediationSettings,
    log::LogSettings, policy::AlertPolicy, telemetry_endpoint::TelemetryEndpointSettings,
};

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// prefix of environment variables overriding the config file, e.g. `POD_BOUNCER__LOG__LEVEL`
const ENV_PREFIX: &str = "POD_BOUNCER";

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub alert_webhook_receiver: AlertReceiverSettings,
    pub telemetry_endpoint: TelemetryEndpointSettings,
    pub policy: AlertPolicy,
    pub remediation: RemediationSettings,
    /// how long in-flight requests may take to finish after a termination signal
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub shutdown_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            alert_webhook_receiver: AlertReceiverSettings::default(),
            telemetry_endpoint: TelemetryEndpointSettings::default(),
            policy: AlertPolicy::default(),
            remediation: RemediationSettings::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Settings {
    pub fn global() -> &'static Self {
        SETTINGS.get_or_init(|| {
            match Self::load().context("failed to load config and command line arguments") {
                Ok(settings) => settings,
                Err(err) => {
                    // tracing wasn't setup yet
                    panic!("{:#?}", err);
                }
            }
        })
    }

    fn command() -> Command<'static> {
        Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .author(clap::crate_authors!())
            .args(&[
                Arg::new("config")
                    .help("path of config file, a missing file is ignored")
                    .takes_value(true)
                    .short('c')
                    .long("config")
                    .default_value("./config.yaml"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["error", "warn", "info", "debug", "trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log"),
            ])
    }

    fn load() -> Result<Self> {
        let opts = Self::command().get_matches();

        let config_path = opts
            .value_of("config")
            .context("config path has a default value")?;

        let mut settings = Self::from_sources(config::File::with_name(config_path).required(false))?;

        if let Some(level) = opts.value_of("level") {
            settings.log.level = level.to_string();
        }

        Ok(settings)
    }

    fn from_sources<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let conf = Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("can't load config")?;

        conf.try_deserialize().context("can't load config")
    }
}
