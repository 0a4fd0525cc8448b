use crate::auth::LocalIdentity;
use crate::dashboard::Dashboard;
use crate::storage::JsonFileBackend;
use crate::store::StatStore;
use std::sync::Arc;

/// Everything the handlers need, built once in `main` and cloned per
/// request. The backend is shared by the store and the identity provider.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StatStore<JsonFileBackend>>,
    pub dashboard: Arc<Dashboard<JsonFileBackend>>,
    pub identity: Arc<LocalIdentity<JsonFileBackend>>,
}

impl AppState {
    pub fn new(backend: JsonFileBackend) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(StatStore::new(Arc::clone(&backend)));
        let dashboard = Arc::new(Dashboard::attach(Arc::clone(&store)));
        let identity = Arc::new(LocalIdentity::new(backend));
        Self {
            store,
            dashboard,
            identity,
        }
    }
}
