use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{
    filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Json,
        }
    }
}

impl LogSettings {
    pub fn global() -> &'static Self {
        &Settings::global().log
    }

    fn filter(&self) -> Result<EnvFilter> {
        let level = tracing::Level::from_str(self.level.as_str())
            .context(format!("invalid log level {:?}", self.level))?;

        let filter = EnvFilter::default()
            .add_directive(LevelFilter::from_level(level).into())
            .add_directive("kube=warn".parse()?)
            .add_directive("hyper=warn".parse()?)
            .add_directive("tower=warn".parse()?);

        #[cfg(feature = "console")]
        let filter = filter
            .add_directive("tokio=trace".parse()?)
            .add_directive("runtime=trace".parse()?);

        Ok(filter)
    }
}

pub fn setup_logging() -> Result<()> {
    let settings = LogSettings::global();
    let json = settings.format == LogFormat::Json;

    let registry = tracing_subscriber::registry().with(settings.filter()?);

    #[cfg(feature = "console")]
    let registry = registry.with(console_subscriber::spawn());

    registry
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(())
}
