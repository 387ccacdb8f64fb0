use std::cell::RefCell;
use std::collections::BTreeMap;

use super::{Container, ContainerFile, RemoteContainer, RemoteResult};
use crate::error::RemoteError;

#[derive(Debug, Default, Clone)]
struct StoredContainer {
    description: String,
    files: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    containers: BTreeMap<String, StoredContainer>,
    update_calls: usize,
}

/// In-process container backend with the same semantics as the HTTP one.
#[derive(Debug, Default)]
pub struct MemoryContainer {
    state: RefCell<MemoryState>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of one file, bypassing the client interface.
    pub fn file(&self, id: &str, filename: &str) -> Option<String> {
        self.state
            .borrow()
            .containers
            .get(id)
            .and_then(|container| container.files.get(filename).cloned())
    }

    pub fn put_file(&self, id: &str, filename: &str, content: impl Into<String>) {
        let mut state = self.state.borrow_mut();
        state
            .containers
            .entry(id.to_string())
            .or_default()
            .files
            .insert(filename.to_string(), content.into());
    }

    pub fn filenames(&self, id: &str) -> Vec<String> {
        self.state
            .borrow()
            .containers
            .get(id)
            .map(|container| container.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn container_count(&self) -> usize {
        self.state.borrow().containers.len()
    }

    /// Number of `update_container` calls served so far.
    pub fn update_calls(&self) -> usize {
        self.state.borrow().update_calls
    }
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::Http {
        status: 404,
        message: format!("container {id} not found"),
    }
}

impl RemoteContainer for MemoryContainer {
    fn create_container(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<String> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = format!("mem-{:04}", state.next_id);
        state.containers.insert(
            id.clone(),
            StoredContainer {
                description: description.to_string(),
                files: files.clone(),
            },
        );
        Ok(id)
    }

    fn get_container(&self, id: &str) -> RemoteResult<Container> {
        let state = self.state.borrow();
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        Ok(Container {
            id: id.to_string(),
            description: container.description.clone(),
            url: Some(format!("memory://{id}")),
            created_at: None,
            updated_at: None,
            files: container
                .files
                .iter()
                .map(|(name, content)| ContainerFile {
                    name: name.clone(),
                    size: Some(content.len() as u64),
                })
                .collect(),
        })
    }

    fn update_container(
        &self,
        id: &str,
        files: &BTreeMap<String, Option<String>>,
    ) -> RemoteResult<()> {
        let mut state = self.state.borrow_mut();
        state.update_calls += 1;
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        for (name, content) in files {
            match content {
                Some(content) => {
                    container.files.insert(name.clone(), content.clone());
                }
                None => {
                    container.files.remove(name);
                }
            }
        }
        Ok(())
    }

    fn find_by_description(&self, description: &str) -> RemoteResult<Option<String>> {
        Ok(self
            .state
            .borrow()
            .containers
            .iter()
            .find(|(_, container)| container.description == description)
            .map(|(id, _)| id.clone()))
    }

    fn get_file_content(&self, id: &str, filename: &str) -> RemoteResult<Option<String>> {
        let state = self.state.borrow();
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        Ok(container.files.get(filename).cloned())
    }
}
