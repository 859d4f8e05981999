use std::sync::Arc;

use shelf_catalog::Catalog;
use shelf_lending::LendingService;

use crate::auth::AuthProvider;

/// Shared handles available to every request.
#[derive(Clone)]
pub struct AppState {
    pub lending: Arc<LendingService>,
    pub catalog: Arc<Catalog>,
    pub auth: Arc<dyn AuthProvider>,
}
