mod decode;
mod in_memory_test;
mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryTestClient, InMemoryTestConnector, InMemoryTestResponseBuilder, RecordedQuery,
    Responder,
};
pub use self::tokio_postgres::{PgClient, PgConnector};
pub use self::decode::{EnumLabel, NumericText};
