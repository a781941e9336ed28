use std::sync::Arc;

use crate::auth::AuthType;
use crate::resolver::ResolvedConfig;
use crate::validation::ConfigErrors;

/// Single-slot cache for the effective configuration of a session
///
/// The resolved value is reused until the auth type or model changes,
/// at which point it is recomputed.
#[derive(Debug, Default)]
pub struct ConfigCache {
    slot: Option<(CacheKey, Arc<ResolvedConfig>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    auth_type: AuthType,
    model: Option<String>,
}

impl ConfigCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached configuration for `(auth_type, model)` or resolve it
    ///
    /// # Errors
    ///
    /// Propagates validation errors from `resolve`; nothing is cached then.
    pub fn get_or_resolve(
        &mut self,
        auth_type: AuthType,
        model: Option<&str>,
        resolve: impl FnOnce() -> Result<ResolvedConfig, ConfigErrors>,
    ) -> Result<Arc<ResolvedConfig>, ConfigErrors> {
        let key = CacheKey {
            auth_type,
            model: model.map(ToOwned::to_owned),
        };

        if let Some((cached_key, config)) = &self.slot
            && *cached_key == key
        {
            return Ok(Arc::clone(config));
        }

        tracing::debug!(auth_type = %auth_type, model = ?model, "resolving configuration after change");

        let config = Arc::new(resolve()?);
        self.slot = Some((key, Arc::clone(&config)));
        Ok(config)
    }

    /// Drop the cached configuration
    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::resolver::ContentGeneratorConfig;
    use crate::provenance::ProvenanceMap;

    fn resolved(model: &str) -> ResolvedConfig {
        let mut config = ContentGeneratorConfig::new(AuthType::OpenAi);
        config.model = model.to_owned();
        ResolvedConfig {
            config,
            provenance: ProvenanceMap::new(),
        }
    }

    #[test]
    fn reuses_until_key_changes() {
        let calls = Cell::new(0);
        let mut cache = ConfigCache::new();

        let mut fetch = |model: &'static str| {
            cache
                .get_or_resolve(AuthType::OpenAi, Some(model), || {
                    calls.set(calls.get() + 1);
                    Ok(resolved(model))
                })
                .unwrap()
        };

        assert_eq!(fetch("a").config.model, "a");
        assert_eq!(fetch("a").config.model, "a");
        assert_eq!(calls.get(), 1);

        assert_eq!(fetch("b").config.model, "b");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = ConfigCache::new();
        let err = cache.get_or_resolve(AuthType::Gemini, None, || Err(ConfigErrors(Vec::new())));
        assert!(err.is_err());

        let ok = cache.get_or_resolve(AuthType::Gemini, None, || Ok(resolved("g")));
        assert_eq!(ok.unwrap().config.model, "g");
    }

    #[test]
    fn invalidate_forces_recompute() {
        let calls = Cell::new(0);
        let mut cache = ConfigCache::new();
        let resolve = || {
            calls.set(calls.get() + 1);
            Ok(resolved("m"))
        };

        cache.get_or_resolve(AuthType::OpenAi, Some("m"), resolve).unwrap();
        cache.invalidate();
        cache.get_or_resolve(AuthType::OpenAi, Some("m"), resolve).unwrap();
        assert_eq!(calls.get(), 2);
    }
}
