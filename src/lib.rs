//! pgrs-adapter - a footprint-based PostgreSQL driver adapter
//!
//! Sits between a query layer that compiles its own SQL and the native
//! tokio-postgres client: opens and releases connections, sends compiled
//! queries, brackets transactions, and normalizes native errors into a small
//! closed set of footprints.
//!
//! # Example
//! ```ignore
//! use pgrs_adapter::{Adapter, CompiledQuery, Footprint, QueryKind};
//!
//! let adapter = Adapter::postgres();
//! let mut conn = adapter.get_connection(&"postgres://localhost/mydb".into()).await?;
//!
//! adapter.begin_transaction(&conn).await?;
//! let insert = CompiledQuery::new(
//!     "INSERT INTO users (email) VALUES ($1)",
//!     vec!["a@b.c".into()],
//! );
//! match adapter.send_native_query(&conn, insert).await {
//!     Ok(_) => adapter.commit_transaction(&conn).await?,
//!     Err(err) => {
//!         adapter.rollback_transaction(&conn).await?;
//!         if let Footprint::NotUnique { keys } = adapter.parse_native_query_error(&err, QueryKind::Insert) {
//!             println!("duplicate value for {keys:?}");
//!         }
//!     }
//! }
//! adapter.release_connection(&mut conn)?;
//! ```

pub mod acquire;
pub mod config;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod listeners;
pub mod normalize;
pub mod release;
pub mod schema;
pub mod traits;
pub mod transaction;
pub mod types;

mod client;

// Re-export main types for convenient access
pub use client::Adapter;
pub use config::{ConnectionConfig, ConnectionDescriptor, ConnectionOverrides};
pub use error::{AdapterError, NativeError, Result};
pub use listeners::ListenerRegistry;
pub use traits::{NativeClient, NativeConnector};
pub use types::{
    BindingTypeMismatch, CompiledQuery, ConnectionHandle, ErrorReport, Footprint, NativeQuery,
    QueryKind, QueryOutcome, RawQueryResult, Row, SqlValue,
};
