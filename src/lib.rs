//! Restmap SDK: declared resources served as REST endpoints over PostgreSQL, with related
//! rows loaded, written and deleted alongside their parent.

pub mod case;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod locator;
pub mod model;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_from_path, load_from_str, resolve, FullConfig, RelationGraph, Settings};
pub use controller::{operation_for, Operation, ResourceController, ResourceRequest, ResourceResponse};
pub use error::{AppError, ConfigError};
pub use locator::{Identifier, ResourceLocator};
pub use model::{Model, Related};
pub use routes::{common_routes, common_routes_with_ready, resource_routes};
pub use sql::{Driver, Envelope, Naming, PgDriver, Query, QueryRunner, StorageError};
pub use state::AppState;
