use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Epoch counter for the shop currently on screen. Bumped on every
/// `init`/`teardown` so late completions for an older shop can be told apart.
#[derive(Debug, Clone, Default)]
pub struct ShopContext {
    epoch: Arc<AtomicU64>,
}

impl ShopContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new context for `shop_id`, invalidating every earlier guard.
    pub fn begin(&self, shop_id: &str) -> ContextGuard {
        let issued = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        ContextGuard {
            epoch: self.epoch.clone(),
            issued,
            shop_id: shop_id.to_string(),
        }
    }

    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

/// Captured when async work starts, checked before its result touches the
/// store.
#[derive(Debug, Clone)]
pub struct ContextGuard {
    epoch: Arc<AtomicU64>,
    issued: u64,
    shop_id: String,
}

impl ContextGuard {
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.issued
    }

    pub fn shop_id(&self) -> &str {
        &self.shop_id
    }
}
