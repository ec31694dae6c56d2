//! LMDB-backed saga repositories (feature `lmdb`)

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use heed::types::{SerdeJson, Str};
use heed::{Database, Env, EnvOpenOptions};
use uuid::Uuid;

use crate::records::{SagaInstance, SagaLog, SagaStepRecord};
use crate::repository::{Page, Pagination, Record, Repository, RepositoryError};
use crate::store::SagaStore;

const MAP_SIZE: usize = 256 * 1024 * 1024;

fn storage(error: heed::Error) -> RepositoryError {
    match error {
        heed::Error::Encoding(e) | heed::Error::Decoding(e) => {
            RepositoryError::Serialization(e.to_string().into())
        }
        other => RepositoryError::Storage(other.to_string().into()),
    }
}

/// One named LMDB database holding JSON-encoded records keyed by UUID string
pub struct LmdbRepository<R: Record> {
    env: Env,
    db: Database<Str, SerdeJson<R>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> LmdbRepository<R> {
    pub fn open(env: &Env, name: &str) -> Result<Self, RepositoryError> {
        let mut wtxn = env.write_txn().map_err(storage)?;
        let db = env
            .create_database::<Str, SerdeJson<R>>(&mut wtxn, Some(name))
            .map_err(storage)?;
        wtxn.commit().map_err(storage)?;
        Ok(Self {
            env: env.clone(),
            db,
            _record: PhantomData,
        })
    }

    fn key(id: R::Id) -> String {
        let uuid: Uuid = id.into();
        uuid.to_string()
    }
}

#[async_trait]
impl<R: Record> Repository<R> for LmdbRepository<R> {
    async fn save(&self, record: &R) -> Result<(), RepositoryError> {
        let mut wtxn = self.env.write_txn().map_err(storage)?;
        self.db
            .put(&mut wtxn, &Self::key(record.id()), record)
            .map_err(storage)?;
        wtxn.commit().map_err(storage)
    }

    async fn find_by_id(&self, id: R::Id) -> Result<Option<R>, RepositoryError> {
        let rtxn = self.env.read_txn().map_err(storage)?;
        self.db.get(&rtxn, &Self::key(id)).map_err(storage)
    }

    async fn find_by_criteria(
        &self,
        criteria: &R::Criteria,
        pagination: Pagination,
    ) -> Result<Page<R>, RepositoryError> {
        let rtxn = self.env.read_txn().map_err(storage)?;
        let mut matching = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(storage)? {
            let (_, record) = entry.map_err(storage)?;
            if record.matches(criteria) {
                matching.push(record);
            }
        }
        matching.sort_by_key(|record| record.sort_key());
        Ok(Page::from_sorted(matching, pagination))
    }

    async fn delete(&self, id: R::Id) -> Result<bool, RepositoryError> {
        let mut wtxn = self.env.write_txn().map_err(storage)?;
        let deleted = self.db.delete(&mut wtxn, &Self::key(id)).map_err(storage)?;
        wtxn.commit().map_err(storage)?;
        Ok(deleted)
    }
}

/// Opens the three saga databases inside one LMDB environment
pub struct LmdbStore;

impl LmdbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<SagaStore, RepositoryError> {
        // SAFETY: the environment directory is owned by this process and is not
        // opened twice.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(3)
                .open(path.as_ref())
        }
        .map_err(storage)?;

        Ok(SagaStore::new(
            Arc::new(LmdbRepository::<SagaInstance>::open(&env, "saga_instances")?),
            Arc::new(LmdbRepository::<SagaStepRecord>::open(&env, "saga_steps")?),
            Arc::new(LmdbRepository::<SagaLog>::open(&env, "saga_logs")?),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SagaStatus;

    #[tokio::test]
    async fn saves_reads_back_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        let mut instance = SagaInstance::new("durable");
        instance.start(1).unwrap();

        store.instances.save(&instance).await.unwrap();
        instance.complete(2).unwrap();
        store.instances.save(&instance).await.unwrap();

        let found = store.instance(instance.id).await.unwrap();
        assert_eq!(found, instance);
        assert_eq!(found.status, SagaStatus::Completed);
        assert!(store.instances.delete(instance.id).await.unwrap());
        assert!(!store.instances.delete(instance.id).await.unwrap());
    }
}
