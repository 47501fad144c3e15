//! Static operator configuration.
//!
//! Values that do not come from the custom resource itself: the image used
//! for newly created deployments, the ownership label, the requeue delay and
//! the defaults applied when the resource leaves a setting empty.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Operator configuration, loadable from TOML.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Image for the application container of a newly created deployment.
    pub image: String,
    /// Label key that marks objects owned by the managed application.
    pub app_label: String,
    /// Port the application container listens on.
    pub container_port: i32,
    /// Value written to the runtime profile variable.
    pub profile: String,
    /// SASL mechanism used when the resource does not name one.
    pub default_scram_mechanism: String,
    /// Delay before a requested requeue, in seconds.
    pub requeue_delay_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            image: "apicurio/apicurio-registry:latest".to_string(),
            app_label: "app".to_string(),
            container_port: 8080,
            profile: "prod".to_string(),
            default_scram_mechanism: "SCRAM-SHA-512".to_string(),
            requeue_delay_secs: 5,
        }
    }
}

impl OperatorConfig {
    /// Parse and validate a configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TomlParseFailed`] for malformed TOML and
    /// [`Error::InvalidConfig`] when a value fails validation.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(document).map_err(|e| Error::toml_parse_failed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileReadFailed`] when the file cannot be read, plus
    /// the errors of [`OperatorConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&document)
    }

    /// Check that the configuration can drive a reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(Error::invalid_config("image must not be empty"));
        }
        if self.app_label.trim().is_empty() {
            return Err(Error::invalid_config("app_label must not be empty"));
        }
        if !(1..=65535).contains(&self.container_port) {
            return Err(Error::invalid_config(format!(
                "container_port {} is out of range",
                self.container_port
            )));
        }
        if self.profile.trim().is_empty() {
            return Err(Error::invalid_config("profile must not be empty"));
        }
        if self.default_scram_mechanism.trim().is_empty() {
            return Err(Error::invalid_config(
                "default_scram_mechanism must not be empty",
            ));
        }
        Ok(())
    }

    /// Delay the host scheduler should wait before a requested requeue.
    #[must_use]
    pub const fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = OperatorConfig::from_toml_str("");
        assert_eq!(config.ok(), Some(OperatorConfig::default()));
    }

    #[test]
    fn test_partial_document_overrides_fields() {
        let config = OperatorConfig::from_toml_str(
            r#"
            image = "registry.local/registry:2.6"
            requeue_delay_secs = 30
            "#,
        );
        let config = config.ok();
        assert_eq!(
            config.as_ref().map(|c| c.image.as_str()),
            Some("registry.local/registry:2.6")
        );
        assert_eq!(
            config.as_ref().map(OperatorConfig::requeue_delay),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.map(|c| c.profile), Some("prod".to_string()));
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let result = OperatorConfig::from_toml_str("image = ");
        assert!(matches!(result, Err(Error::TomlParseFailed { .. })));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let result = OperatorConfig::from_toml_str(r#"image = "  ""#);
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_port_out_of_range_is_rejected() {
        let config = OperatorConfig {
            container_port: 0,
            ..OperatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_reads_document() {
        let file = tempfile::NamedTempFile::new();
        assert!(file.is_ok());
        let Ok(mut file) = file else { return };
        let written = writeln!(file, "profile = \"dev\"");
        assert!(written.is_ok());

        let config = OperatorConfig::from_file(file.path());
        assert_eq!(config.ok().map(|c| c.profile), Some("dev".to_string()));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = OperatorConfig::from_file("/nonexistent/operator.toml");
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }
}
