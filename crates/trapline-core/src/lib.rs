//! Core domain model and shared logic for the Trapline pipeline
//!
//! Trapline ingests camera-trap imagery delivered over FTPS, runs it through
//! object detection and species classification, and fans results out as
//! notifications. This crate holds everything the worker crates share:
//!
//! - [`config`] - environment-driven settings, validated at process start
//! - [`telemetry`] - tracing subscriber setup (json or text)
//! - [`model`] - database entities and their status/role enums
//! - [`messages`] - queue message payloads, one schema per pipeline stage
//! - [`geo`] - haversine distance and deployment-period clustering
//! - [`events`] - independence-interval event grouping
//! - [`authz`] - project-scoped role rules
//!
//! # See Also
//!
//! - [`trapline-db`](https://docs.rs/trapline-db) - PostgreSQL store
//! - [`trapline-queue`](https://docs.rs/trapline-queue) - Redis queue bus
//! - [`trapline-storage`](https://docs.rs/trapline-storage) - S3/MinIO object store

pub mod authz;
pub mod config;
pub mod events;
pub mod geo;
pub mod messages;
pub mod model;
pub mod telemetry;

pub use config::Settings;
pub use model::{
    Camera, CameraStatus, Channel, Classification, Detection, DetectionCategory, Image,
    ImageStatus, NotificationStatus, Project, Role, User,
};
