use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::shutdown::Shutdown;

/// Everything a command handler can reach.
pub struct App {
    pub repository: Repository,
    pub config: Config,
    pub shutdown: Shutdown,
}

impl App {
    pub async fn new(config: Config, shutdown: Shutdown) -> Result<Self> {
        let repository = Repository::new(&config.db_url).await?;
        tracing::debug!("Opened database at {}", config.db_url);

        Ok(Self {
            repository,
            config,
            shutdown,
        })
    }
}
