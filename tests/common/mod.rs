#![allow(dead_code)]

pub mod mocks;
pub mod strategies;

use std::sync::Arc;

use stagesync_core::config::StageSyncConfig;
use stagesync_core::coordination::InMemoryCoordinationStore;
use stagesync_core::orchestration::StagePlan;

pub use mocks::*;

pub fn test_config() -> StageSyncConfig {
    let config = StageSyncConfig::default();
    config.validate().expect("default configuration must validate");
    config
}

pub fn store() -> Arc<InMemoryCoordinationStore> {
    Arc::new(InMemoryCoordinationStore::new())
}

pub fn plan(config: &StageSyncConfig) -> StagePlan {
    StagePlan::from_config(config)
}
