use std::path::Path;

use http::{HeaderName, HeaderValue};
use url::Url;

use crate::settings::Settings;

impl Settings {
    /// Load settings from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read settings file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse settings from TOML text, expanding placeholders first
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("settings variable expansion failed: {e}"))?;

        let settings: Self =
            toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse settings: {e}"))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate that the settings are internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error for malformed custom headers, unsupported URL
    /// schemes, or an unparseable timeout
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_custom_headers()?;
        self.validate_urls()?;

        if let Some(timeout) = &self.model.timeout {
            duration_str::parse(timeout).map_err(|e| anyhow::anyhow!("invalid model.timeout '{timeout}': {e}"))?;
        }

        Ok(())
    }

    fn validate_custom_headers(&self) -> anyhow::Result<()> {
        let Some(headers) = &self.model.custom_headers else {
            return Ok(());
        };

        for (name, value) in headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow::anyhow!("invalid custom header name '{name}': {e}"))?;
            HeaderValue::from_str(value).map_err(|e| anyhow::anyhow!("invalid value for custom header '{name}': {e}"))?;
        }

        Ok(())
    }

    fn validate_urls(&self) -> anyhow::Result<()> {
        if let Some(base_url) = &self.model.base_url {
            require_scheme("model.baseUrl", base_url, &["http", "https"])?;
        }

        if let Some(proxy) = &self.proxy {
            require_scheme("proxy", proxy, &["http", "https", "socks5", "socks5h"])?;
        }

        Ok(())
    }
}

fn require_scheme(key: &str, url: &Url, allowed: &[&str]) -> anyhow::Result<()> {
    if allowed.contains(&url.scheme()) {
        return Ok(());
    }

    anyhow::bail!(
        "{key} must use one of the schemes {}, got '{}'",
        allowed.join(", "),
        url.scheme()
    )
}
