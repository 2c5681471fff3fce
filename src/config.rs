use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// Postgres connection string for the survey database
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    /// Directory holding per-run staging areas and prepared exports
    #[arg(long, env = "REPORT_STAGING_DIR", default_value = "./tmp")]
    pub staging_dir: PathBuf,

    /// Concurrent document workers per school bundle (defaults to CPU count)
    #[arg(long, env = "REPORT_WORKERS")]
    pub workers: Option<NonZeroUsize>,
}

impl ReportArgs {
    pub fn workers(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3001")]
    pub listen: SocketAddr,

    /// HS256 secret used to verify bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
}
