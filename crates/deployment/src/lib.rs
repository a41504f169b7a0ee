use async_trait::async_trait;
use db::DBService;
use thiserror::Error;

mod config;

pub use config::{Config, ConfigError};

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn db(&self) -> &DBService;

    fn config(&self) -> &Config;
}

#[derive(Clone)]
pub struct LocalDeployment {
    db: DBService,
    config: Config,
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config = Config::load_or_init()?;
        let db = DBService::new().await?;
        Ok(Self { db, config })
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn config(&self) -> &Config {
        &self.config
    }
}
