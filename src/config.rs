use std::path::Path;

use serde::Deserialize;

/// Configuration loaded from `unmodule.toml` in the working directory.
/// Command-line flags win over config values; config values win over
/// built-in defaults.
#[derive(Debug, Deserialize, Default)]
pub struct UnmoduleConfig {
    /// Default output format: "amd", "cjs", or "umd".
    pub format: Option<String>,
    /// Default strict-mode setting.
    pub strict: Option<bool>,
    /// Default UMD global name.
    pub name: Option<String>,
    /// Default AMD module id.
    pub amd_name: Option<String>,
    /// Text prepended to every artifact.
    pub banner: Option<String>,
    /// Text appended to every artifact.
    pub footer: Option<String>,
    /// Default base directory for bundle resolution.
    pub base: Option<String>,
}

impl UnmoduleConfig {
    /// Load configuration from `unmodule.toml` in the given directory.
    ///
    /// Returns a default (empty) configuration if the file does not exist or
    /// cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join("unmodule.toml");

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("warning: failed to parse unmodule.toml: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                eprintln!("warning: failed to read unmodule.toml: {err}. Using defaults.");
                Self::default()
            }
        }
    }
}
