use std::collections::HashMap;
use std::fmt;

use crate::error::{CmdError, Result};
use crate::packet::Request;

/// A command implementation.
///
/// Returns the value echoed to the MCU in the response frame.
pub trait CommandHandler: Send {
    fn call(&mut self, req: &mut Request<'_>) -> u32;
}

impl<F> CommandHandler for F
where
    F: FnMut(&mut Request<'_>) -> u32 + Send,
{
    fn call(&mut self, req: &mut Request<'_>) -> u32 {
        self(req)
    }
}

/// One registered command.
pub struct CommandEntry {
    pub id: u16,
    pub name: String,
    handler: Box<dyn CommandHandler>,
}

impl CommandEntry {
    pub fn call(&mut self, req: &mut Request<'_>) -> u32 {
        self.handler.call(req)
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Command id to handler map.
#[derive(Debug, Default)]
pub struct CommandTable {
    entries: HashMap<u16, CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A second registration of the same id is a
    /// configuration bug and fails.
    pub fn register(
        &mut self,
        id: u16,
        name: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> Result<()> {
        if let Some(existing) = self.entries.get(&id) {
            return Err(CmdError::DuplicateCommand {
                id,
                existing: existing.name.clone(),
            });
        }
        let name = name.into();
        tracing::debug!(cmd = id, %name, "command registered");
        self.entries.insert(
            id,
            CommandEntry {
                id,
                name,
                handler: Box::new(handler),
            },
        );
        Ok(())
    }

    /// Register a closure.
    pub fn register_fn<F>(&mut self, id: u16, name: impl Into<String>, handler: F) -> Result<()>
    where
        F: FnMut(&mut Request<'_>) -> u32 + Send + 'static,
    {
        self.register(id, name, handler)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut CommandEntry> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn name(&self, id: u16) -> Option<&str> {
        self.entries.get(&id).map(|e| e.name.as_str())
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
