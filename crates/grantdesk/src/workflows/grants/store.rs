use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    Application, ApplicationId, ApplicationMutation, ApplicationNumber, NumberingScope,
};
use super::repository::{ApplicationQuery, ApplicationRepository, RepositoryError, UpdateGuard};

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<ApplicationId, Application>,
    numbers: HashMap<ApplicationNumber, ApplicationId>,
    sequences: HashMap<NumberingScope, u32>,
}

/// Process-local application store. One lock serializes every operation, which gives each
/// trait method the single-document atomicity the lifecycle service relies on.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    state: Mutex<StoreState>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("application store lock poisoned".into()))
    }

    /// Number of stored records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.lock().map(|state| state.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ApplicationRepository for InMemoryApplicationStore {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut state = self.lock()?;
        if state.records.contains_key(&application.id)
            || state.numbers.contains_key(&application.application_number)
        {
            return Err(RepositoryError::Conflict);
        }
        state
            .numbers
            .insert(application.application_number.clone(), application.id.clone());
        state
            .records
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .records
            .get(id)
            .filter(|record| !record.is_deleted)
            .cloned())
    }

    fn fetch_by_number(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Option<Application>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .numbers
            .get(number)
            .and_then(|id| state.records.get(id))
            .filter(|record| !record.is_deleted)
            .cloned())
    }

    fn apply(
        &self,
        id: &ApplicationId,
        guard: &UpdateGuard,
        mutation: ApplicationMutation,
    ) -> Result<Application, RepositoryError> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(id)
            .filter(|record| !record.is_deleted)
            .ok_or(RepositoryError::NotFound)?;
        guard.check(record)?;
        mutation.apply_to(record);
        Ok(record.clone())
    }

    fn apply_many(
        &self,
        ids: &[ApplicationId],
        mutation: &ApplicationMutation,
    ) -> Result<usize, RepositoryError> {
        let mut state = self.lock()?;
        let mut updated = 0;
        for id in ids {
            if let Some(record) = state
                .records
                .get_mut(id)
                .filter(|record| !record.is_deleted)
            {
                mutation.clone().apply_to(record);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn query(&self, query: &ApplicationQuery) -> Result<Vec<Application>, RepositoryError> {
        let state = self.lock()?;
        let mut matches: Vec<Application> = state
            .records
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.application_number.cmp(&a.application_number))
        });
        Ok(matches)
    }

    fn next_sequence(&self, scope: &NumberingScope) -> Result<u32, RepositoryError> {
        let mut state = self.lock()?;
        let counter = state.sequences.entry(*scope).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
