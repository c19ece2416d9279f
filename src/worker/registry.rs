//! # Handler Registry
//!
//! Maps each job type to the handler that executes it. Registration happens at
//! startup; lookups are concurrent.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::handler::SyncJobHandler;
use crate::constants::JobType;
use crate::error::{Result, SyncError};

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: DashMap<JobType, Arc<dyn SyncJobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its job type. A second handler for the same job
    /// type is rejected.
    pub fn register(&self, handler: Arc<dyn SyncJobHandler>) -> Result<()> {
        let job_type = handler.job_type();
        match self.handlers.entry(job_type) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SyncError::Registry(format!(
                "handler already registered for {job_type}"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handler);
                info!(job_type = %job_type, "📝 Registered job handler");
                Ok(())
            }
        }
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn SyncJobHandler>> {
        let handler = self.handlers.get(&job_type).map(|entry| entry.value().clone());
        if handler.is_none() {
            debug!(job_type = %job_type, "No handler registered");
        }
        handler
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// Registered job types in declaration order
    pub fn registered_job_types(&self) -> Vec<JobType> {
        JobType::ALL
            .iter()
            .copied()
            .filter(|job_type| self.handlers.contains_key(job_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::handler::{JobContext, JobError};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct NoopHandler(JobType);

    #[async_trait]
    impl SyncJobHandler for NoopHandler {
        fn job_type(&self) -> JobType {
            self.0
        }

        async fn handle(&self, _context: &JobContext) -> std::result::Result<(), JobError> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = HandlerRegistry::new();
        registry
            .register(Arc::new(NoopHandler(JobType::Products)))
            .unwrap();

        let err = registry
            .register(Arc::new(NoopHandler(JobType::Products)))
            .unwrap_err();
        assert!(matches!(err, SyncError::Registry(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registered_job_types_in_declaration_order() {
        let registry = HandlerRegistry::new();
        for job_type in [JobType::Orders, JobType::Customers, JobType::Products] {
            registry.register(Arc::new(NoopHandler(job_type))).unwrap();
        }

        assert_eq!(
            registry.registered_job_types(),
            vec![JobType::Products, JobType::Customers, JobType::Orders]
        );
        assert!(registry.get(JobType::Pricelists).is_none());
    }
}
