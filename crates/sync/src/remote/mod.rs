//! Client side of the shared file container.
//!
//! The backend is a named-file container: files are created, read and
//! replaced as a set, and a file is deleted by updating it to `None`.

mod gist;
mod memory;
mod retry;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

pub use gist::GistClient;
pub use memory::MemoryContainer;
pub use retry::RetryPolicy;

use crate::error::RemoteError;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub name: String,
    /// Size in bytes as reported by the backend.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub description: String,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Sorted by name.
    pub files: Vec<ContainerFile>,
}

impl Container {
    pub fn has_file(&self, filename: &str) -> bool {
        self.files.iter().any(|file| file.name == filename)
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().filter_map(|file| file.size).sum()
    }
}

pub trait RemoteContainer {
    /// Creates a private container holding `files` and returns its id.
    fn create_container(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<String>;

    fn get_container(&self, id: &str) -> RemoteResult<Container>;

    /// Writes every entry in one request; `None` deletes the file.
    fn update_container(
        &self,
        id: &str,
        files: &BTreeMap<String, Option<String>>,
    ) -> RemoteResult<()>;

    fn find_by_description(&self, description: &str) -> RemoteResult<Option<String>>;

    /// `Ok(None)` when the container exists but has no such file.
    fn get_file_content(&self, id: &str, filename: &str) -> RemoteResult<Option<String>>;
}

impl<T: RemoteContainer + ?Sized> RemoteContainer for &T {
    fn create_container(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<String> {
        (**self).create_container(files, description)
    }

    fn get_container(&self, id: &str) -> RemoteResult<Container> {
        (**self).get_container(id)
    }

    fn update_container(
        &self,
        id: &str,
        files: &BTreeMap<String, Option<String>>,
    ) -> RemoteResult<()> {
        (**self).update_container(id, files)
    }

    fn find_by_description(&self, description: &str) -> RemoteResult<Option<String>> {
        (**self).find_by_description(description)
    }

    fn get_file_content(&self, id: &str, filename: &str) -> RemoteResult<Option<String>> {
        (**self).get_file_content(id, filename)
    }
}

impl<T: RemoteContainer + ?Sized> RemoteContainer for Box<T> {
    fn create_container(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<String> {
        (**self).create_container(files, description)
    }

    fn get_container(&self, id: &str) -> RemoteResult<Container> {
        (**self).get_container(id)
    }

    fn update_container(
        &self,
        id: &str,
        files: &BTreeMap<String, Option<String>>,
    ) -> RemoteResult<()> {
        (**self).update_container(id, files)
    }

    fn find_by_description(&self, description: &str) -> RemoteResult<Option<String>> {
        (**self).find_by_description(description)
    }

    fn get_file_content(&self, id: &str, filename: &str) -> RemoteResult<Option<String>> {
        (**self).get_file_content(id, filename)
    }
}
