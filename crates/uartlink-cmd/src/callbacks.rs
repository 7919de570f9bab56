use crate::error::{CmdError, Result};

/// Maximum number of named callbacks.
pub const MAX_CALLBACKS: usize = 12;

/// Maximum callback name length in bytes.
pub const MAX_CALLBACK_NAME_LEN: usize = 15;

/// Callback tokens the MCU registered under a name.
///
/// Collaborators look a token up by name to push unsolicited responses
/// (e.g. a status change) to the MCU. Insertion order is kept.
#[derive(Debug, Default, Clone)]
pub struct CallbackRegistry {
    entries: Vec<(String, u32)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, overwriting the token of an existing entry.
    pub fn add(&mut self, name: &str, token: u32) -> Result<()> {
        if name.len() > MAX_CALLBACK_NAME_LEN {
            return Err(CmdError::CallbackNameTooLong {
                len: name.len(),
                max: MAX_CALLBACK_NAME_LEN,
            });
        }
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = token;
            return Ok(());
        }
        if self.entries.len() >= MAX_CALLBACKS {
            return Err(CmdError::CallbackRegistryFull { max: MAX_CALLBACKS });
        }
        self.entries.push((name.to_owned(), token));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, token)| token)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), *t))
    }
}
