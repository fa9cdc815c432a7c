use std::collections::HashMap;

use crate::app::App;
use crate::error::{AppError, Result};

use super::auth::current_user;
use super::handlers::{PublicCommand, UserCommand};

/// How a registered command is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Public(PublicCommand),
    /// Runs only once the current user has been resolved.
    Authenticated(UserCommand),
}

pub struct CommandRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry holding every command the CLI understands.
    pub fn with_builtin_commands() -> Self {
        let mut registry = Self::new();
        registry.register("register", Handler::Public(PublicCommand::Register));
        registry.register("login", Handler::Public(PublicCommand::Login));
        registry.register("reset", Handler::Public(PublicCommand::Reset));
        registry.register("users", Handler::Public(PublicCommand::Users));
        registry.register("agg", Handler::Public(PublicCommand::Agg));
        registry.register("feeds", Handler::Public(PublicCommand::Feeds));
        registry.register("addfeed", Handler::Authenticated(UserCommand::AddFeed));
        registry.register("follow", Handler::Authenticated(UserCommand::Follow));
        registry.register("following", Handler::Authenticated(UserCommand::Following));
        registry.register("unfollow", Handler::Authenticated(UserCommand::Unfollow));
        registry.register("browse", Handler::Authenticated(UserCommand::Browse));
        registry
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub async fn execute(&self, name: &str, args: &[String], app: &mut App) -> Result<()> {
        let handler = self
            .handlers
            .get(name)
            .copied()
            .ok_or_else(|| AppError::UnknownCommand(name.to_string()))?;

        tracing::debug!("Running {} with {:?}", name, args);

        match handler {
            Handler::Public(command) => command.run(app, args).await,
            Handler::Authenticated(command) => {
                let user = current_user(app).await?;
                command.run(app, args, &user).await
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtin_commands()
    }
}
