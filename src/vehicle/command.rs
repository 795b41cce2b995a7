//! Remote commands exposed by the vehicle backend.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Command registry key for start/stop style commands (climatization, charging, window heating).
pub const START_STOP: &str = "start-stop";
/// Command registry key for the central locking command.
pub const LOCK_UNLOCK: &str = "lock-unlock";
/// Command registry key for the honk/flash command.
pub const HONK_FLASH: &str = "honk-flash";

/// Error raised by the vehicle backend when a command or setter fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetterError {
    #[error("{0} is disabled")]
    Disabled(String),

    #[error("{0} is not supported by this vehicle")]
    NotSupported(String),

    #[error("vehicle backend rejected the request: {0}")]
    Rejected(String),
}

/// Argument passed to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum CommandAction {
    Start,
    Stop,
    Lock,
    Unlock,
    Flash,
    Honk,
    HonkAndFlash,
}

pub type CommandHandler = Arc<dyn Fn(CommandAction) -> Result<(), SetterError> + Send + Sync>;

/// A single executable command.
pub struct Command {
    name: String,
    enabled: AtomicBool,
    handler: RwLock<Option<CommandHandler>>,
}

impl Command {
    /// Create an enabled command backed by `handler`.
    pub fn new(name: impl Into<String>, handler: CommandHandler) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(true),
            handler: RwLock::new(Some(handler)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Replace the backend handler.
    pub fn set_handler(&self, handler: CommandHandler) {
        *self.handler.write() = Some(handler);
    }

    /// Execute the command, blocking until the backend has accepted or rejected it.
    pub fn execute(&self, action: CommandAction) -> Result<(), SetterError> {
        if !self.enabled() {
            return Err(SetterError::Disabled(self.name.clone()));
        }
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler(action),
            None => Err(SetterError::NotSupported(self.name.clone())),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("enabled", &self.enabled())
            .finish()
    }
}

/// Commands of one vehicle region, keyed by command name.
#[derive(Default, Debug)]
pub struct Commands {
    commands: RwLock<BTreeMap<String, Arc<Command>>>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, command: Command) -> Arc<Command> {
        let command = Arc::new(command);
        self.commands
            .write()
            .insert(command.name().to_string(), command.clone());
        command
    }

    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }
}
