mod footprint;
mod handle;
mod query;
mod row;
mod sql_value;

pub use footprint::{ErrorReport, Footprint, QueryKind};
pub use handle::{ConnectionHandle, ReleaseFn};
pub use query::{CompiledQuery, NativeQuery};
pub use row::{QueryOutcome, RawQueryResult, Row};
pub use sql_value::{BindingTypeMismatch, SqlValue};
