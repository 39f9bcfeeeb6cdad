use std::sync::Arc;

use crate::application::repos::StoreHealth;
use crate::cache::InvalidationTrigger;

#[derive(Clone)]
pub struct AdminState {
    pub db: Arc<dyn StoreHealth>,
    pub invalidation: Arc<InvalidationTrigger>,
}
