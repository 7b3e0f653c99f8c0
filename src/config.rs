//! Layered runtime configuration: defaults, then a TOML file, then
//! `CALLSTEER_*` environment variables (`__` separates nesting, e.g.
//! `CALLSTEER_SESSION__STARTING_POINTS=250`).

use std::path::Path;

use config::{Environment, File};
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, GiftCatalog, GiftCatalogEntry};
use crate::session::SessionConfig;
use crate::sim::SimTransportConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub transport: SimTransportConfig,
    /// Replaces the stock gift catalog when non-empty.
    pub catalog: Vec<GiftCatalogEntry>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("callsteer").required(false)),
        };
        let config: Config = builder
            .add_source(Environment::with_prefix("CALLSTEER").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// The configured catalog, or the stock one when none is given.
    pub fn catalog(&self) -> Result<GiftCatalog, CatalogError> {
        if self.catalog.is_empty() {
            Ok(GiftCatalog::default())
        } else {
            GiftCatalog::from_entries(self.catalog.clone())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.session.audio;
        if audio.poll_interval_ms == 0 || audio.poll_interval_ms >= 100 {
            return Err(ConfigError::Invalid(format!(
                "session.audio.poll_interval_ms must stay under 100ms, got {}",
                audio.poll_interval_ms
            )));
        }
        if !(audio.ema_alpha > 0.0 && audio.ema_alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "session.audio.ema_alpha must be in (0, 1], got {}",
                audio.ema_alpha
            )));
        }

        let quality = &self.session.quality;
        if quality.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.quality.sample_interval_ms must be positive".to_string(),
            ));
        }
        if quality.degrade_after == 0
            || quality.degrade_after > quality.recover_after
            || quality.recover_after > quality.abandon_after
        {
            return Err(ConfigError::Invalid(format!(
                "escalation thresholds must satisfy 0 < degrade <= recover <= abandon, \
                 got {}/{}/{}",
                quality.degrade_after, quality.recover_after, quality.abandon_after
            )));
        }
        if quality.max_recovery_attempts == 0 {
            return Err(ConfigError::Invalid(
                "session.quality.max_recovery_attempts must be positive".to_string(),
            ));
        }

        if self.session.grace_period_ms == 0 || self.session.animation_ttl_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.grace_period_ms and session.animation_ttl_ms must be positive"
                    .to_string(),
            ));
        }

        for (name, p) in [
            ("degrade_probability", self.transport.degrade_probability),
            ("recover_probability", self.transport.recover_probability),
            ("adjust_success_rate", self.transport.adjust_success_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "transport.{name} must be in [0, 1], got {p}"
                )));
            }
        }

        if !self.catalog.is_empty() {
            GiftCatalog::from_entries(self.catalog.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.session.starting_points, 100);
        assert_eq!(config.session.quality.degrade_after, 2);
        assert!(config.catalog.is_empty());
        assert!(!config.catalog().unwrap().is_empty());
    }

    #[test]
    fn toml_overrides_nest_into_components() {
        let config: Config = toml::from_str(
            r#"
            [session]
            starting_points = 250
            grace_period_ms = 8000

            [session.quality]
            degrade_after = 3
            recover_after = 5
            abandon_after = 9

            [transport]
            degrade_probability = 0.5
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.session.starting_points, 250);
        assert_eq!(config.session.grace_period_ms, 8_000);
        assert_eq!(config.session.quality.degrade_after, 3);
        assert_eq!(config.session.quality.abandon_after, 9);
        assert_eq!(config.session.audio.poll_interval_ms, 50, "untouched defaults stay");
        assert_eq!(config.transport.degrade_probability, 0.5);
    }

    #[test]
    fn catalog_override_is_validated() {
        let config: Config = toml::from_str(
            r#"
            [[catalog]]
            id = "meteor"
            display_name = "Meteor"
            point_cost = 0
            animation = "burning"
            icon = "meteor.webp"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Catalog(CatalogError::ZeroCost(_)))
        ));
    }

    #[test]
    fn slow_audio_poll_is_rejected() {
        let mut config = Config::default();
        config.session.audio.poll_interval_ms = 250;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unordered_thresholds_are_rejected() {
        let mut config = Config::default();
        config.session.quality.recover_after = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
