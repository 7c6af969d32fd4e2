//! PostgreSQL store for the Trapline pipeline
//!
//! Source of truth for cameras, deployments, images, detections,
//! classifications, users, projects, memberships, notification preferences
//! and delivery logs. One [`Database`] per worker process; the underlying
//! tokio-postgres client pipelines concurrent queries, so `&self` methods can
//! be shared across tasks behind an `Arc`.
//!
//! The schema is created on startup with `CREATE TABLE IF NOT EXISTS` DDL
//! (see [`schema`]); migration tooling is deliberately out of scope.
//!
//! # Example
//!
//! ```rust,ignore
//! use trapline_db::Database;
//!
//! async fn example() -> Result<(), trapline_db::Error> {
//!     let db = Database::connect("host=localhost user=trapline dbname=trapline").await?;
//!     db.init_schema().await?;
//!     let camera = db.get_camera_by_serial("861943070068027").await?;
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod cameras;
pub mod classifications;
pub mod deployments;
pub mod detections;
mod error;
pub mod images;
pub mod notifications;
pub mod observations;
pub mod projects;
pub mod schema;
pub mod stats;
pub mod users;

pub use error::{Error, Result};

use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

/// Handle to the relational store
pub struct Database {
    client: Client,
}

impl Database {
    /// Connect and spawn the connection driver task.
    ///
    /// # Errors
    /// Returns an error if the connection string is invalid or the server is
    /// unreachable.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;

        // The connection object performs the actual I/O; it must be polled
        // for the client to make progress.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection error");
            }
        });

        info!("database connected");
        Ok(Self { client })
    }

    /// Create all tables and indexes that do not exist yet.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn init_schema(&self) -> Result<()> {
        self.client.batch_execute(schema::DDL).await?;
        info!("database schema ensured");
        Ok(())
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }
}
