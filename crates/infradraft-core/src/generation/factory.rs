//! Builds the generator roster from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::GeneratorSpec;

use super::{Generator, HttpGenerator, StubGenerator};

/// Build one generator per spec.
///
/// A spec becomes an [`HttpGenerator`] when it has an endpoint and its API
/// key variable is set; otherwise it degrades to a [`StubGenerator`] with the
/// same id prefixed by `stub-`.
pub fn build_generators(specs: &[GeneratorSpec]) -> Vec<Arc<dyn Generator>> {
    specs
        .iter()
        .map(|spec| build_one(spec, std::env::var(&spec.api_key_env).ok()))
        .collect()
}

fn build_one(spec: &GeneratorSpec, api_key: Option<String>) -> Arc<dyn Generator> {
    let stub = |reason: &str| -> Arc<dyn Generator> {
        warn!(generator = %spec.id, reason = %reason, "using stub generator");
        Arc::new(StubGenerator::new(format!("stub-{}", spec.id)))
    };

    let Some(endpoint) = spec.endpoint.as_deref() else {
        return stub("no endpoint configured");
    };
    let Some(key) = api_key.filter(|k| !k.trim().is_empty()) else {
        return stub(&format!("{} is not set", spec.api_key_env));
    };

    match HttpGenerator::new(&spec.id, &spec.model, endpoint, key) {
        Ok(generator) => {
            info!(generator = %spec.id, model = %spec.model, "using remote generator");
            Arc::new(generator)
        }
        Err(e) => stub(&e.to_string()),
    }
}
