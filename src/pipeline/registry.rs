// SPDX-License-Identifier: GPL-3.0-only

//! Ordered set of installed modules
//!
//! The registry only tracks membership, order and attachment. Lifecycle
//! callbacks around insertion and removal are driven by the session through
//! the dispatcher so that they happen synchronously with the mutation.

use super::module::{ModuleHandle, ModuleRef, PipelineModule};
use crate::errors::DuplicateNameError;
use tracing::debug;

/// Attachment state of a registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attachment {
    #[default]
    Detached,
    Attached,
}

/// A module plus its registration data
pub(crate) struct RegisteredModule {
    pub id: u64,
    pub module: PipelineModule,
    pub attachment: Attachment,
}

impl RegisteredModule {
    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn is_attached(&self) -> bool {
        self.attachment == Attachment::Attached
    }

    pub fn handle(&self) -> ModuleHandle {
        ModuleHandle {
            id: self.id,
            name: self.module.name().to_string(),
        }
    }
}

/// Outcome of adding several modules at once
#[derive(Debug, Default)]
pub struct BatchAddReport {
    /// Handles of the modules that were added, in order
    pub added: Vec<ModuleHandle>,
    /// One entry per rejected module
    pub rejected: Vec<DuplicateNameError>,
}

impl BatchAddReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Insertion-ordered module registry with unique names
#[derive(Default)]
pub struct ModuleRegistry {
    entries: Vec<RegisteredModule>,
    next_id: u64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Module names in registry order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    /// Attachment of `name`, or `None` if it is not registered
    pub fn attachment(&self, name: &str) -> Option<Attachment> {
        self.position(name).map(|i| self.entries[i].attachment)
    }

    /// Names of attached modules in registry order
    pub fn attached_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.is_attached())
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Append `module`; rejects duplicate names and leaves the registered
    /// module untouched
    pub(crate) fn insert(
        &mut self,
        module: PipelineModule,
    ) -> Result<usize, DuplicateNameError> {
        if self.contains(module.name()) {
            return Err(DuplicateNameError {
                name: module.name().to_string(),
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        debug!(module = %module.name(), id, "Registering module");
        self.entries.push(RegisteredModule {
            id,
            module,
            attachment: Attachment::Detached,
        });
        Ok(self.entries.len() - 1)
    }

    /// Index of the module `target` refers to
    pub(crate) fn find(&self, target: &ModuleRef) -> Option<usize> {
        match target {
            ModuleRef::Name(name) => self.position(name),
            ModuleRef::Handle(handle) => self.entries.iter().position(|e| e.id == handle.id),
        }
    }

    /// Remove and return the entry at `index`, preserving the order of the rest
    pub(crate) fn take(&mut self, index: usize) -> RegisteredModule {
        let entry = self.entries.remove(index);
        debug!(module = %entry.name(), "Unregistering module");
        entry
    }

    pub(crate) fn entry(&self, index: usize) -> &RegisteredModule {
        &self.entries[index]
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> &mut RegisteredModule {
        &mut self.entries[index]
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut RegisteredModule> {
        self.entries.iter_mut()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == name)
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .field("attached", &self.attached_names())
            .finish()
    }
}
