//! Settings document (spec §6): one structured object with top-level flags
//! and one sub-object per declared app.

use std::collections::BTreeMap;

use dirt_core::{DirtError, Result};
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// Top-level recognised keys (spec §6 table). `logging` is deliberately
/// `serde_json::Value` — it is opaque to this crate and only meaningful to
/// whatever logging collaborator the host wires up (see `dirt-cli`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default, rename = "DEBUG")]
    pub debug: bool,

    #[serde(default, rename = "USE_RELOADER")]
    pub use_reloader: bool,

    #[serde(default, rename = "ALLOW_MOCK_API")]
    pub allow_mock_api: bool,

    #[serde(default, rename = "LOGGING")]
    pub logging: Option<dirt_core::Value>,

    /// Template path with `{app_name}` substitution.
    #[serde(default, rename = "DIRT_APP_PIDFILE")]
    pub pidfile_template: Option<String>,

    #[serde(default)]
    pub apps: BTreeMap<String, AppSettings>,
}

/// Per-app recognised keys (spec §6 table).
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub app_class: String,

    #[serde(default, alias = "bind_url")]
    pub bind: Option<String>,

    #[serde(default, alias = "remote_url")]
    pub remote: Option<String>,

    #[serde(default = "default_native_binding")]
    pub rpc_proxy: String,

    #[serde(default = "default_native_binding")]
    pub rpc_class: String,

    #[serde(default)]
    pub mock_cls: Option<String>,

    #[serde(default)]
    pub blocking_detector_timeout: Option<f64>,

    #[serde(default)]
    pub blocking_detector_raise_exc: bool,

    #[serde(default = "default_true")]
    pub use_reloader: bool,
}

fn default_native_binding() -> String {
    "native".to_string()
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| DirtError::configuration(format!("invalid settings document: {err}")))
    }

    pub fn app(&self, name: &str) -> Result<&AppSettings> {
        self.apps
            .get(name)
            .ok_or_else(|| DirtError::configuration(format!("no app named `{name}` in settings")))
    }

    /// `DIRT_APP_PIDFILE` with `{app_name}` substituted, if configured.
    pub fn pidfile_path(&self, app_name: &str) -> Option<String> {
        self.pidfile_template
            .as_ref()
            .map(|template| template.replace("{app_name}", app_name))
    }

    /// `NO_MOCK_<APPNAME>=1` disables mock fallback for that app (spec §6),
    /// regardless of `ALLOW_MOCK_API`.
    pub fn mock_disabled_by_env(app_name: &str) -> bool {
        let key = format!("NO_MOCK_{}", app_name.to_uppercase());
        std::env::var(key).map(|v| v == "1").unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_top_level_and_per_app_keys() {
        let text = r#"
            DEBUG = true
            ALLOW_MOCK_API = true
            DIRT_APP_PIDFILE = "/tmp/{app_name}.pid"

            [apps.first]
            app_class = "demo::First"
            bind = "dirt://127.0.0.1:9001"
            mock_cls = "demo::FirstMock"

            [apps.second]
            app_class = "demo::Second"
            remote_url = "dirt://127.0.0.1:9001"
        "#;
        let settings = Settings::from_toml_str(text).unwrap();
        assert!(settings.debug);
        assert!(settings.allow_mock_api);
        assert_eq!(settings.pidfile_path("first").unwrap(), "/tmp/first.pid");

        let first = settings.app("first").unwrap();
        assert_eq!(first.bind.as_deref(), Some("dirt://127.0.0.1:9001"));
        assert_eq!(first.rpc_proxy, "native");

        let second = settings.app("second").unwrap();
        assert_eq!(second.remote.as_deref(), Some("dirt://127.0.0.1:9001"));
    }

    #[test]
    fn unknown_app_is_a_configuration_error() {
        let settings = Settings::from_toml_str("").unwrap();
        assert!(settings.app("missing").is_err());
    }
}
