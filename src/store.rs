//! The three saga repositories bundled together, plus typed read-back helpers

use std::sync::Arc;

use crate::context::{SagaInstanceId, SagaStepId};
use crate::errors::SagaError;
use crate::records::{SagaInstance, SagaLog, SagaStepRecord};
use crate::repository::{
    InMemoryRepository, LogCriteria, Pagination, Record, Repository, RepositoryError,
    StepCriteria,
};

/// Everything persisted about one run, for auditing and diagnosis
#[derive(Clone, Debug)]
pub struct SagaTrail {
    pub instance: SagaInstance,
    /// Ascending `order`
    pub steps: Vec<SagaStepRecord>,
    /// Ascending `sequence`
    pub logs: Vec<SagaLog>,
}

#[derive(Clone)]
pub struct SagaStore {
    pub instances: Arc<dyn Repository<SagaInstance>>,
    pub steps: Arc<dyn Repository<SagaStepRecord>>,
    pub logs: Arc<dyn Repository<SagaLog>>,
}

impl SagaStore {
    pub fn new(
        instances: Arc<dyn Repository<SagaInstance>>,
        steps: Arc<dyn Repository<SagaStepRecord>>,
        logs: Arc<dyn Repository<SagaLog>>,
    ) -> Self {
        Self {
            instances,
            steps,
            logs,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRepository::<SagaInstance>::new()),
            Arc::new(InMemoryRepository::<SagaStepRecord>::new()),
            Arc::new(InMemoryRepository::<SagaLog>::new()),
        )
    }

    /// Read back an instance that is expected to exist
    pub async fn instance(&self, id: SagaInstanceId) -> Result<SagaInstance, SagaError> {
        self.instances
            .find_by_id(id)
            .await?
            .ok_or(SagaError::RecordNotFound {
                kind: SagaInstance::KIND,
                id: id.into(),
            })
    }

    /// Read back a step that is expected to exist
    pub async fn step(&self, id: SagaStepId) -> Result<SagaStepRecord, SagaError> {
        self.steps
            .find_by_id(id)
            .await?
            .ok_or(SagaError::RecordNotFound {
                kind: SagaStepRecord::KIND,
                id: id.into(),
            })
    }

    pub async fn steps_of(
        &self,
        instance_id: SagaInstanceId,
    ) -> Result<Vec<SagaStepRecord>, RepositoryError> {
        collect_all(
            self.steps.as_ref(),
            &StepCriteria::for_instance(instance_id),
        )
        .await
    }

    pub async fn logs_of(&self, instance_id: SagaInstanceId) -> Result<Vec<SagaLog>, RepositoryError> {
        collect_all(self.logs.as_ref(), &LogCriteria::for_instance(instance_id)).await
    }

    /// Instance, steps and logs of one run
    pub async fn trail(&self, instance_id: SagaInstanceId) -> Result<SagaTrail, SagaError> {
        let instance = self.instance(instance_id).await?;
        let steps = self.steps_of(instance_id).await?;
        let logs = self.logs_of(instance_id).await?;
        Ok(SagaTrail {
            instance,
            steps,
            logs,
        })
    }
}

async fn collect_all<R: Record>(
    repository: &dyn Repository<R>,
    criteria: &R::Criteria,
) -> Result<Vec<R>, RepositoryError> {
    let mut pagination = Pagination::default();
    let mut all = Vec::new();
    loop {
        let page = repository.find_by_criteria(criteria, pagination).await?;
        let more = page.has_more() && !page.items.is_empty();
        all.extend(page.items);
        if !more {
            return Ok(all);
        }
        pagination = pagination.next();
    }
}
