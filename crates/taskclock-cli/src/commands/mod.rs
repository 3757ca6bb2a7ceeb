pub mod completions;
pub mod config;
pub mod log;
pub mod session;
pub mod timer;

use serde::Serialize;
use std::error::Error;
use std::future::Future;
use std::path::PathBuf;

use taskclock_core::{Config, SqliteGateway, TimeTracker, UserId, ValidationError};

/// Global flags shared by every command.
pub struct Context {
    pub user: Option<String>,
    pub db: Option<PathBuf>,
}

impl Context {
    pub fn open_gateway(&self, config: &Config) -> Result<SqliteGateway, Box<dyn Error>> {
        let path = match &self.db {
            Some(path) => path.clone(),
            None => config.database_path()?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(SqliteGateway::open_at(&path)?)
    }

    pub fn user(&self, config: &Config) -> Result<UserId, Box<dyn Error>> {
        self.user
            .clone()
            .or_else(|| config.identity.user.clone())
            .map(UserId::new)
            .ok_or_else(|| ValidationError::NoCurrentUser.into())
    }

    /// Open the store, sign the user in and restore their open timers.
    pub async fn tracker(&self) -> Result<TimeTracker<SqliteGateway>, Box<dyn Error>> {
        let config = Config::load()?;
        let user = self.user(&config)?;
        let tracker = TimeTracker::from_config(self.open_gateway(&config)?, &config.tracker);
        tracker.sign_in(user).await?;
        Ok(tracker)
    }
}

/// Run `fut` to completion on a single-threaded runtime.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output, Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(fut);
    // An idle stdin reader must not hold up exit.
    runtime.shutdown_background();
    Ok(output)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
