use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use deadpool::managed::{self, Metrics, Object, Pool, PoolError, RecycleError, RecycleResult};
use futures_util::{pin_mut, TryStreamExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use super::decode::decode_value;
use crate::config::ConnectionConfig;
use crate::error::NativeError;
use crate::listeners::{ErrorListener, ListenerSet};
use crate::traits::{NativeClient, NativeConnector};
use crate::types::{ConnectionHandle, RawQueryResult, Row, SqlValue};

/// A tokio-postgres client plus the listeners its connection task reports to.
pub struct PgConnection {
    client: Client,
    listeners: Arc<ListenerSet>,
}

/// Open a connection and spawn its connection future.
///
/// When the connection future fails, the connection's own listeners hear it
/// first, then the pool-level listeners.
async fn open(
    config: &tokio_postgres::Config,
    pool_listeners: &Arc<ListenerSet>,
) -> std::result::Result<PgConnection, tokio_postgres::Error> {
    let (client, connection) = config.connect(NoTls).await?;
    let listeners = Arc::new(ListenerSet::new());

    let task_listeners = Arc::clone(&listeners);
    let task_pool_listeners = Arc::clone(pool_listeners);
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            let err = NativeError::from(e);
            task_listeners.emit(&err);
            task_pool_listeners.emit(&err);
        }
    });

    Ok(PgConnection { client, listeners })
}

/// deadpool manager creating tokio-postgres connections for one configuration.
pub struct PgManager {
    config: tokio_postgres::Config,
    pool_listeners: Arc<ListenerSet>,
}

impl managed::Manager for PgManager {
    type Type = PgConnection;
    type Error = tokio_postgres::Error;

    async fn create(&self) -> std::result::Result<PgConnection, tokio_postgres::Error> {
        open(&self.config, &self.pool_listeners).await
    }

    async fn recycle(
        &self,
        conn: &mut PgConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<tokio_postgres::Error> {
        if conn.client.is_closed() {
            return Err(RecycleError::Message("connection closed".into()));
        }
        // Listeners bound during the previous lease belong to that lease.
        conn.listeners.clear();
        Ok(())
    }
}

enum Lease {
    Pooled(Object<PgManager>),
    Direct(PgConnection),
}

impl Deref for Lease {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Lease::Pooled(object) => &**object,
            Lease::Direct(conn) => conn,
        }
    }
}

/// PostgreSQL client leased from a [`PgConnector`].
pub struct PgClient {
    lease: tokio::sync::Mutex<Option<Lease>>,
    listeners: Arc<ListenerSet>,
}

impl PgClient {
    fn new(lease: Lease) -> Arc<Self> {
        let listeners = Arc::clone(&lease.listeners);
        Arc::new(Self {
            lease: tokio::sync::Mutex::new(Some(lease)),
            listeners,
        })
    }

    /// Give the connection back: pooled connections return to their pool,
    /// direct ones close.
    fn detach(&self) -> std::result::Result<(), NativeError> {
        let mut slot = self
            .lease
            .try_lock()
            .map_err(|_| NativeError::message("connection is busy with an in-flight query"))?;
        match slot.take() {
            Some(lease) => {
                drop(lease);
                Ok(())
            }
            None => Err(NativeError::message("connection was already released")),
        }
    }
}

#[async_trait]
impl NativeClient for PgClient {
    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<RawQueryResult, NativeError> {
        let slot = self.lease.lock().await;
        let conn = slot
            .as_ref()
            .ok_or_else(|| NativeError::message("connection was already released"))?;
        run_query(&conn.client, sql, params).await
    }

    fn on_error(&self, listener: ErrorListener) {
        self.listeners.add(listener);
    }
}

/// PostgreSQL connector using tokio-postgres.
///
/// By default connections come from deadpool pools, one per distinct
/// working configuration, created on first use. [`PgConnector::unpooled`]
/// opens a fresh connection for every acquisition instead.
pub struct PgConnector {
    pools: Option<Mutex<HashMap<ConnectionConfig, Pool<PgManager>>>>,
    max_size: Option<usize>,
    pool_listeners: Arc<ListenerSet>,
}

impl PgConnector {
    pub fn new() -> Self {
        Self {
            pools: Some(Mutex::new(HashMap::new())),
            max_size: None,
            pool_listeners: Arc::new(ListenerSet::new()),
        }
    }

    /// Connect directly, without pooling.
    pub fn unpooled() -> Self {
        Self {
            pools: None,
            ..Self::new()
        }
    }

    /// Pass a maximum size through to pools created from now on.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    fn pool_for(
        &self,
        pools: &Mutex<HashMap<ConnectionConfig, Pool<PgManager>>>,
        config: &ConnectionConfig,
    ) -> std::result::Result<Pool<PgManager>, NativeError> {
        let mut pools = pools.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = pools.get(config) {
            return Ok(pool.clone());
        }

        let manager = PgManager {
            config: config.to_pg_config(),
            pool_listeners: Arc::clone(&self.pool_listeners),
        };
        let mut builder = Pool::builder(manager);
        if let Some(max_size) = self.max_size {
            builder = builder.max_size(max_size);
        }
        let pool = builder
            .build()
            .map_err(|e| NativeError::message(format!("failed to build pool: {e}")))?;
        debug!(host = %config.host, port = config.port, "created connection pool");
        pools.insert(config.clone(), pool.clone());
        Ok(pool)
    }
}

impl Default for PgConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NativeConnector for PgConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> std::result::Result<ConnectionHandle, NativeError> {
        let lease = match &self.pools {
            Some(pools) => {
                let pool = self.pool_for(pools, config)?;
                let object = pool.get().await.map_err(|e| match e {
                    PoolError::Backend(e) => NativeError::from(e),
                    other => NativeError::message(other.to_string()),
                })?;
                Lease::Pooled(object)
            }
            None => Lease::Direct(open(&config.to_pg_config(), &self.pool_listeners).await?),
        };

        let client = PgClient::new(lease);
        let releaser = Arc::clone(&client);
        Ok(ConnectionHandle::new(
            client,
            Box::new(move || releaser.detach()),
        ))
    }

    fn on_pool_error(&self, listener: ErrorListener) {
        self.pool_listeners.add(listener);
    }
}

/// Run one extended-protocol query and collect its rows.
async fn run_query(
    client: &Client,
    sql: &str,
    params: &[SqlValue],
) -> std::result::Result<RawQueryResult, NativeError> {
    let param_refs: Vec<&(dyn ToSql + Sync)> =
        params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let stream = client.query_raw(sql, param_refs.iter().copied()).await?;
    pin_mut!(stream);

    let mut pg_rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        pg_rows.push(row);
    }

    let columns: Vec<String> = match pg_rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => Vec::new(),
    };
    let mut rows = Vec::with_capacity(pg_rows.len());
    for row in &pg_rows {
        let values = (0..row.len())
            .map(|i| decode_value(row, i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.push(Row::new(&columns, values));
    }
    let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);

    Ok(RawQueryResult::new(command_tag(sql), row_count, columns, rows))
}

/// Leading keyword of the statement, upper-cased.
fn command_tag(sql: &str) -> String {
    sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}
