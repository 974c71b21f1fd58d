//! Applies decoded trace records to a target store

use crate::error::{ReplayError, Result};
use crate::store::{ColumnFamilyHandle, KvStore, ReadOptions, WriteBatch, WriteOptions};
use crate::trace::{
    GetQueryRecord, IteratorSeekQueryRecord, MultiGetQueryRecord, SeekType, TraceRecordHandler,
    WriteQueryRecord,
};
use std::collections::HashMap;
use tracing::trace;

/// Executes records against a borrowed [`KvStore`]
///
/// The column family map is built once from the caller's live handles and
/// never changes afterwards, so one handler can serve every replay worker.
pub struct TraceExecutionHandler<'a, S: KvStore + ?Sized> {
    store: &'a S,
    cf_map: HashMap<u32, &'a ColumnFamilyHandle>,
    write_options: WriteOptions,
    read_options: ReadOptions,
}

impl<'a, S: KvStore + ?Sized> TraceExecutionHandler<'a, S> {
    /// Build a handler over `store` that can resolve the ids of `handles`
    pub fn new(store: &'a S, handles: &[&'a ColumnFamilyHandle]) -> Result<Self> {
        if handles.is_empty() {
            return Err(ReplayError::InvalidArgument(
                "at least one column family handle is required".to_string(),
            ));
        }

        let mut cf_map = HashMap::with_capacity(handles.len());
        for handle in handles {
            if cf_map.insert(handle.id(), *handle).is_some() {
                return Err(ReplayError::InvalidArgument(format!(
                    "duplicate column family id {}",
                    handle.id()
                )));
            }
        }

        Ok(Self {
            store,
            cf_map,
            write_options: WriteOptions::default(),
            read_options: ReadOptions::default(),
        })
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn column_family(&self, cf_id: u32) -> Option<&'a ColumnFamilyHandle> {
        self.cf_map.get(&cf_id).copied()
    }

    fn resolve(&self, cf_id: u32) -> Result<&'a ColumnFamilyHandle> {
        self.column_family(cf_id).ok_or_else(|| {
            ReplayError::Corruption(format!("Invalid column family id {}", cf_id))
        })
    }
}

impl<S: KvStore + ?Sized> TraceRecordHandler for TraceExecutionHandler<'_, S> {
    fn handle_write(&self, record: &WriteQueryRecord) -> Result<()> {
        let batch = WriteBatch::from_rep(record.rep.clone())?;
        trace!(ops = batch.count(), "Replaying write batch");
        self.store.write(&self.write_options, &batch)
    }

    fn handle_get(&self, record: &GetQueryRecord) -> Result<()> {
        let cf = self.resolve(record.cf_id)?;
        match self.store.get(&self.read_options, cf, &record.key) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn handle_iterator_seek(&self, record: &IteratorSeekQueryRecord) -> Result<()> {
        let cf = self.resolve(record.cf_id)?;

        let mut options = self.read_options.clone();
        options.iterate_lower_bound = record.lower_bound.clone();
        options.iterate_upper_bound = record.upper_bound.clone();

        // The iterator is dropped at the end of this scope on every path.
        let mut iter = self.store.new_iterator(&options, cf)?;
        match record.seek_type {
            SeekType::Seek => iter.seek(&record.key),
            SeekType::SeekForPrev => iter.seek_for_prev(&record.key),
        }
        iter.status()
    }

    fn handle_multi_get(&self, record: &MultiGetQueryRecord) -> Result<()> {
        let cfs = record
            .cf_ids
            .iter()
            .map(|id| self.resolve(*id))
            .collect::<Result<Vec<_>>>()?;

        if cfs.is_empty() || record.keys.is_empty() {
            return Err(ReplayError::InvalidArgument(
                "multi_get requires at least one column family and key".to_string(),
            ));
        }
        if cfs.len() != record.keys.len() {
            return Err(ReplayError::InvalidArgument(format!(
                "multi_get has {} column families for {} keys",
                cfs.len(),
                record.keys.len()
            )));
        }

        let results = self.store.multi_get(&self.read_options, &cfs, &record.keys);
        for result in results {
            match result {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
