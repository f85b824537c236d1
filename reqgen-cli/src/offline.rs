//! Capabilities for running without a live API.

use std::cell::RefCell;

use reqgen::{CreatedResource, IdProvider, ProviderError, Randomness, ResourceCreator};
use serde_json::{Map, Value};

/// Hands out a fresh uuid for every id request, drawn from its own random
/// source so seeded runs repeat.
#[derive(Debug, Default, Clone)]
pub struct OfflineIdProvider {
    random: RefCell<Randomness>,
}

impl OfflineIdProvider {
    #[must_use]
    pub fn new(random: Randomness) -> Self {
        Self {
            random: RefCell::new(random),
        }
    }

    #[must_use]
    pub fn seeded(seed: Option<u64>) -> Self {
        Self::new(seed.map_or_else(Randomness::from_entropy, Randomness::seeded))
    }
}

impl IdProvider for OfflineIdProvider {
    fn valid_id(&self, path: &str, _operation_id: Option<&str>) -> Result<Value, ProviderError> {
        let mut bytes = [0u8; 16];
        self.random.borrow_mut().fill_bytes(&mut bytes);
        let id = uuid::Builder::from_random_bytes(bytes).into_uuid().to_string();
        tracing::debug!("Offline id {} for {}", id, path);
        Ok(Value::String(id))
    }
}

/// Logs create requests instead of sending them and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunCreator;

impl ResourceCreator for DryRunCreator {
    fn create(
        &self,
        path: &str,
        body: &Value,
        _query: &Map<String, Value>,
        _headers: &Map<String, Value>,
    ) -> Result<CreatedResource, ProviderError> {
        tracing::info!("Dry run: POST {} {}", path, body);
        Ok(CreatedResource {
            ok: true,
            status_code: 201,
            body: body.clone(),
        })
    }
}
