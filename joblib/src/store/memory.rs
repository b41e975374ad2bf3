use super::{Execution, ExecutionStore, Result, StoreError};
use crate::types::JobId;
use chrono::Utc;
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

/// An execution store kept entirely in memory. Records are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    executions: Mutex<HashMap<JobId, Execution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn executions(&self) -> MutexGuard<'_, HashMap<JobId, Execution>> {
        self.executions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExecutionStore for MemoryStore {
    fn migrate(&self) -> Result<()> {
        Ok(())
    }

    fn get_execution(&self, id: &str) -> Result<Execution> {
        self.executions()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn create_execution(&self, execution: &Execution) -> Result<()> {
        match self.executions().entry(execution.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(execution.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(execution.clone());
                Ok(())
            }
        }
    }

    fn update_execution(&self, execution: &Execution) -> Result<()> {
        match self.executions().get_mut(&execution.id) {
            Some(stored) => {
                *stored = Execution {
                    updated_at: Utc::now(),
                    created_at: stored.created_at,
                    ..execution.clone()
                };
                Ok(())
            }
            None => Err(StoreError::NotFound(execution.id.clone())),
        }
    }
}
