use std::sync::Arc;

use crate::{config::AppConfig, db::OrmConn, middleware::throttle::Throttle, notify::Notifier};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub notifier: Notifier,
    pub http: reqwest::Client,
    pub throttle: Throttle,
}

impl AppState {
    pub fn new(orm: OrmConn, config: AppConfig, notifier: Notifier) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.catalog_fetch_timeout_secs))
            .build()?;
        let throttle = Throttle::per_minute(config.rate_limit_per_minute);
        Ok(Self {
            orm,
            config: Arc::new(config),
            notifier,
            http,
            throttle,
        })
    }
}
