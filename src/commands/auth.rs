use crate::app::App;
use crate::error::{AppError, Result};
use crate::models::User;

/// Resolve the user named in the config against storage.
pub async fn current_user(app: &App) -> Result<User> {
    let name = app
        .config
        .current_user_name
        .as_deref()
        .ok_or(AppError::NotLoggedIn)?;

    app.repository
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| AppError::UserNotFound(name.to_string()))
}
