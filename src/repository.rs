//! Repository storage trait for saga records

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::context::{SagaInstanceId, SagaLogId, SagaStepId};
use crate::errors::RecordKind;
use crate::records::{SagaInstance, SagaLog, SagaLogType, SagaStepRecord};
use crate::state::SagaStatus;

/// A record type that can live in a [`Repository`]
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Into<Uuid> + Send + Sync + 'static;
    /// Filter accepted by `find_by_criteria`
    type Criteria: Send + Sync;
    /// Ordering of `find_by_criteria` results
    type SortKey: Ord;

    const KIND: RecordKind;

    fn id(&self) -> Self::Id;
    fn matches(&self, criteria: &Self::Criteria) -> bool;
    fn sort_key(&self) -> Self::SortKey;
}

/// Filter for saga instances
#[derive(Clone, Debug, Default)]
pub struct InstanceCriteria {
    pub status: Option<SagaStatus>,
    pub name_contains: Option<String>,
}

/// Filter for saga steps
#[derive(Clone, Debug, Default)]
pub struct StepCriteria {
    pub saga_instance_id: Option<SagaInstanceId>,
    pub status: Option<SagaStatus>,
}

impl StepCriteria {
    pub fn for_instance(id: SagaInstanceId) -> Self {
        Self {
            saga_instance_id: Some(id),
            ..Self::default()
        }
    }
}

/// Filter for saga logs
#[derive(Clone, Debug, Default)]
pub struct LogCriteria {
    pub saga_instance_id: Option<SagaInstanceId>,
    pub saga_step_id: Option<SagaStepId>,
    pub log_type: Option<SagaLogType>,
}

impl LogCriteria {
    pub fn for_instance(id: SagaInstanceId) -> Self {
        Self {
            saga_instance_id: Some(id),
            ..Self::default()
        }
    }
}

impl Record for SagaInstance {
    type Id = SagaInstanceId;
    type Criteria = InstanceCriteria;
    type SortKey = (u64, SagaInstanceId);

    const KIND: RecordKind = RecordKind::Instance;

    fn id(&self) -> SagaInstanceId {
        self.id
    }

    fn matches(&self, criteria: &InstanceCriteria) -> bool {
        criteria.status.map_or(true, |s| s == self.status)
            && criteria
                .name_contains
                .as_deref()
                .map_or(true, |needle| self.name.contains(needle))
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.start_date.unwrap_or(0), self.id)
    }
}

impl Record for SagaStepRecord {
    type Id = SagaStepId;
    type Criteria = StepCriteria;
    type SortKey = (SagaInstanceId, u32);

    const KIND: RecordKind = RecordKind::Step;

    fn id(&self) -> SagaStepId {
        self.id
    }

    fn matches(&self, criteria: &StepCriteria) -> bool {
        criteria
            .saga_instance_id
            .map_or(true, |id| id == self.saga_instance_id)
            && criteria.status.map_or(true, |s| s == self.status)
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.saga_instance_id, self.order)
    }
}

impl Record for SagaLog {
    type Id = SagaLogId;
    type Criteria = LogCriteria;
    type SortKey = (SagaInstanceId, u64);

    const KIND: RecordKind = RecordKind::Log;

    fn id(&self) -> SagaLogId {
        self.id
    }

    fn matches(&self, criteria: &LogCriteria) -> bool {
        criteria
            .saga_instance_id
            .map_or(true, |id| id == self.saga_instance_id)
            && criteria.saga_step_id.map_or(true, |id| id == self.saga_step_id)
            && criteria.log_type.map_or(true, |t| t == self.log_type)
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.saga_instance_id, self.sequence)
    }
}

/// Offset/limit window for `find_by_criteria`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: usize) -> Self {
        Self::new(0, limit)
    }

    /// The window right after this one
    pub fn next(&self) -> Self {
        Self::new(self.offset + self.limit, self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}

/// One window of matching records plus the total match count
#[derive(Clone, Debug)]
pub struct Page<R> {
    pub items: Vec<R>,
    pub total: usize,
    pub pagination: Pagination,
}

impl<R> Page<R> {
    /// Slice an already filtered and sorted result set
    pub fn from_sorted(all: Vec<R>, pagination: Pagination) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit)
            .collect();
        Self {
            items,
            total,
            pagination,
        }
    }

    pub fn has_more(&self) -> bool {
        self.pagination.offset + self.items.len() < self.total
    }
}

/// Persistence boundary for one record type
#[async_trait]
pub trait Repository<R: Record>: Send + Sync + 'static {
    /// Create or update
    async fn save(&self, record: &R) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: R::Id) -> Result<Option<R>, RepositoryError>;
    async fn find_by_criteria(
        &self,
        criteria: &R::Criteria,
        pagination: Pagination,
    ) -> Result<Page<R>, RepositoryError>;
    /// Returns whether a record was removed
    async fn delete(&self, id: R::Id) -> Result<bool, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(Box<str>),
    #[error("Serialization error: {0}")]
    Serialization(Box<str>),
}

/// In-memory repository for tests and single-process use
pub struct InMemoryRepository<R: Record> {
    data: RwLock<HashMap<R::Id, R>>,
}

impl<R: Record> InMemoryRepository<R> {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Record> Default for InMemoryRepository<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Repository<R> for InMemoryRepository<R> {
    async fn save(&self, record: &R) -> Result<(), RepositoryError> {
        let mut data = self
            .data
            .write()
            .map_err(|e| RepositoryError::Storage(e.to_string().into()))?;
        data.insert(record.id(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: R::Id) -> Result<Option<R>, RepositoryError> {
        let data = self
            .data
            .read()
            .map_err(|e| RepositoryError::Storage(e.to_string().into()))?;
        Ok(data.get(&id).cloned())
    }

    async fn find_by_criteria(
        &self,
        criteria: &R::Criteria,
        pagination: Pagination,
    ) -> Result<Page<R>, RepositoryError> {
        let mut matching: Vec<R> = {
            let data = self
                .data
                .read()
                .map_err(|e| RepositoryError::Storage(e.to_string().into()))?;
            data.values().filter(|r| r.matches(criteria)).cloned().collect()
        };
        matching.sort_by_key(|r| r.sort_key());
        Ok(Page::from_sorted(matching, pagination))
    }

    async fn delete(&self, id: R::Id) -> Result<bool, RepositoryError> {
        let mut data = self
            .data
            .write()
            .map_err(|e| RepositoryError::Storage(e.to_string().into()))?;
        Ok(data.remove(&id).is_some())
    }
}
