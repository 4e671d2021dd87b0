use crate::config::AppConfig;
use crate::limiter::RateLimiter;
use cockpit_engine::SharedContext;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ctx: SharedContext,
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(ctx: SharedContext, config: AppConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
        Self {
            ctx,
            config: Arc::new(config),
            limiter,
        }
    }
}
