//! SQL text generation, statement execution and the storage driver seam.

mod builder;
mod driver;
pub mod postgres;
mod runner;

pub use builder::*;
pub use driver::*;
pub use postgres::PgDriver;
pub use runner::*;
