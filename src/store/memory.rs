use super::{SidecarStore, StoreError};
use crate::step::StepRecord;
use crate::template::ReplacementMap;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory store, for exercising aggregation without touching disk
#[derive(Debug, Default)]
pub struct MemorySidecarStore {
    records: RwLock<HashMap<String, StepRecord>>,
    stage: RwLock<Option<String>>,
    preproc: RwLock<Option<ReplacementMap>>,
}

impl MemorySidecarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SidecarStore for MemorySidecarStore {
    fn put(&self, name: &str, record: &StepRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .unwrap()
            .insert(name.to_string(), record.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<StepRecord, StoreError> {
        self.records
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.read().unwrap().keys().cloned().collect())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.records.write().unwrap().remove(name);
        Ok(())
    }

    fn read_stage(&self) -> Result<Option<String>, StoreError> {
        Ok(self.stage.read().unwrap().clone())
    }

    fn write_stage(&self, stage: &str) -> Result<(), StoreError> {
        *self.stage.write().unwrap() = Some(stage.to_string());
        Ok(())
    }

    fn read_preproc(&self) -> Result<Option<ReplacementMap>, StoreError> {
        Ok(self.preproc.read().unwrap().clone())
    }

    fn write_preproc(&self, replacements: &ReplacementMap) -> Result<(), StoreError> {
        *self.preproc.write().unwrap() = Some(replacements.clone());
        Ok(())
    }

    fn clear_snapshots(&self) -> Result<(), StoreError> {
        *self.stage.write().unwrap() = None;
        *self.preproc.write().unwrap() = None;
        Ok(())
    }
}
