use std::path::PathBuf;

use crate::errors::AuthzError;
use crate::persistence::file::LoadFallback;

pub const DEFAULT_CONFIG_FILE: &str = "authz.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    pub config_file: PathBuf,
    pub strict_subjects: bool,
    pub load_fallback: LoadFallback,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            strict_subjects: false,
            load_fallback: LoadFallback::Keep,
        }
    }
}

impl AuthzConfig {
    /// Reads `AUTHZ_CONFIG_FILE`, `AUTHZ_STRICT_SUBJECTS` and `AUTHZ_LOAD_FALLBACK`.
    pub fn from_env() -> Result<Self, AuthzError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthzError> {
        let defaults = Self::default();

        let config_file = lookup("AUTHZ_CONFIG_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.config_file);

        let strict_subjects = match lookup("AUTHZ_STRICT_SUBJECTS") {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| AuthzError::configuration("AUTHZ_STRICT_SUBJECTS must be true or false"))?,
            None => defaults.strict_subjects,
        };

        let load_fallback = match lookup("AUTHZ_LOAD_FALLBACK") {
            Some(value) => value.parse::<LoadFallback>().map_err(AuthzError::configuration)?,
            None => defaults.load_fallback,
        };

        Ok(Self {
            config_file,
            strict_subjects,
            load_fallback,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
