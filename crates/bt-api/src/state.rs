use std::sync::Arc;

use bt_config::AppConfig;
use bt_core::traits::{ArticleSource, IdentityProvider};
use bt_core::Community;

/// State shared by every handler. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub community: Community,
    pub identity: Arc<dyn IdentityProvider>,
    pub articles: Arc<dyn ArticleSource>,
    pub config: Arc<AppConfig>,
}
