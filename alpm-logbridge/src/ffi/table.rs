use std::collections::HashMap;

use log::debug;

use super::{LogRegistry, LoggedHandle};
use crate::api::BridgeError;
use crate::bridge::LogBridge;

/// Installed bridges keyed by handle address.
pub struct InstallTable<R: LogRegistry> {
    handles: HashMap<usize, LoggedHandle<R>>,
}

impl<R: LogRegistry> InstallTable<R> {
    pub fn new() -> Self {
        InstallTable {
            handles: HashMap::new(),
        }
    }

    /// Installs `bridge` on the handle at `key`, replacing an earlier bridge.
    /// `open` wraps the handle the first time `key` is seen.
    pub fn install<F>(&mut self, key: usize, bridge: LogBridge, open: F) -> Result<(), BridgeError>
    where
        F: FnOnce() -> Result<R, BridgeError>,
    {
        if let Some(logged) = self.handles.get_mut(&key) {
            debug!("Replacing log handler on handle {:#x}", key);
            return logged.install_logging(bridge);
        }

        let mut logged = LoggedHandle::new(open()?);
        logged.install_logging(bridge)?;
        self.handles.insert(key, logged);

        debug!("Installed log handler on handle {:#x}", key);
        Ok(())
    }

    /// Clears the callback of the handle at `key` and forgets the handle.
    /// The entry is removed even if clearing fails.
    pub fn uninstall(&mut self, key: usize) -> Result<(), BridgeError> {
        match self.handles.remove(&key) {
            Some(mut logged) => logged.uninstall_logging(),
            None => Ok(()),
        }
    }

    pub fn get(&self, key: usize) -> Option<&LoggedHandle<R>> {
        self.handles.get(&key)
    }

    pub fn get_mut(&mut self, key: usize) -> Option<&mut LoggedHandle<R>> {
        self.handles.get_mut(&key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<R: LogRegistry> Default for InstallTable<R> {
    fn default() -> Self {
        Self::new()
    }
}
