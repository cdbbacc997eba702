use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ConnectionConfig;
use crate::error::NativeError;
use crate::listeners::{ErrorListener, ListenerSet};
use crate::traits::{NativeClient, NativeConnector};
use crate::types::{ConnectionHandle, RawQueryResult, Row, SqlValue};

type Response = std::result::Result<RawQueryResult, NativeError>;

/// Computes a response from the query when nothing is queued.
pub type Responder = Arc<dyn Fn(&str, &[SqlValue]) -> Response + Send + Sync>;

/// A recorded query execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    /// Which connection ran the query, in connect order starting at 0.
    pub connection_id: usize,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

struct Shared {
    responses: Mutex<VecDeque<Response>>,
    recorded_queries: Mutex<Vec<RecordedQuery>>,
    default_response: Mutex<RawQueryResult>,
    responder: Mutex<Option<Responder>>,
    connect_failures: Mutex<VecDeque<NativeError>>,
    connects: Mutex<Vec<ConnectionConfig>>,
    release_failure: Mutex<Option<NativeError>>,
    releases: AtomicUsize,
    pool_listeners: ListenerSet,
    clients: Mutex<Vec<Arc<InMemoryTestClient>>>,
}

/// An in-memory native connector for testing.
///
/// Hands out scripted clients, records every query they run, and lets tests
/// inject connect, query, release and disconnect failures.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use pgrs_adapter::drivers::{InMemoryTestConnector, InMemoryTestResponseBuilder};
/// use serde_json::json;
///
/// let connector = Arc::new(
///     InMemoryTestConnector::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["id", "name"])
///             .row(vec![json!(1), json!("Alice")])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryTestConnector {
    shared: Arc<Shared>,
}

impl InMemoryTestConnector {
    /// Create a connector with no pre-configured responses.
    /// Unscripted queries succeed with an empty result.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                responses: Mutex::new(VecDeque::new()),
                recorded_queries: Mutex::new(Vec::new()),
                default_response: Mutex::new(RawQueryResult::empty("SELECT")),
                responder: Mutex::new(None),
                connect_failures: Mutex::new(VecDeque::new()),
                connects: Mutex::new(Vec::new()),
                release_failure: Mutex::new(None),
                releases: AtomicUsize::new(0),
                pool_listeners: ListenerSet::new(),
                clients: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Add a response to be returned by the next query on any connection.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: RawQueryResult) -> Self {
        self.shared.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Add multiple responses to be returned by subsequent queries.
    pub fn with_responses(self, responses: impl IntoIterator<Item = RawQueryResult>) -> Self {
        let mut queue = self.shared.responses.lock().unwrap();
        for response in responses {
            queue.push_back(Ok(response));
        }
        drop(queue);
        self
    }

    /// Make the next query fail with the given native error.
    pub fn with_query_error(self, err: NativeError) -> Self {
        self.shared.responses.lock().unwrap().push_back(Err(err));
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(self, response: RawQueryResult) -> Self {
        *self.shared.default_response.lock().unwrap() = response;
        self
    }

    /// Compute responses from the query text and bindings when nothing is queued.
    pub fn with_responder(
        self,
        responder: impl Fn(&str, &[SqlValue]) -> Response + Send + Sync + 'static,
    ) -> Self {
        *self.shared.responder.lock().unwrap() = Some(Arc::new(responder));
        self
    }

    /// Make the next connect attempt fail.
    pub fn with_connect_error(self, err: NativeError) -> Self {
        self.shared.connect_failures.lock().unwrap().push_back(err);
        self
    }

    /// Make every release capability handed out from now on fail.
    pub fn with_release_error(self, err: NativeError) -> Self {
        *self.shared.release_failure.lock().unwrap() = Some(err);
        self
    }

    /// Get all recorded queries that have been executed.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.shared.recorded_queries.lock().unwrap().clone()
    }

    /// Get the last recorded query, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.shared.recorded_queries.lock().unwrap().last().cloned()
    }

    /// Clear all recorded queries.
    pub fn clear_recorded_queries(&self) {
        self.shared.recorded_queries.lock().unwrap().clear();
    }

    /// Configurations passed to every connect attempt, failed ones included.
    pub fn connect_attempts(&self) -> Vec<ConnectionConfig> {
        self.shared.connects.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connects.lock().unwrap().len()
    }

    /// Number of release capabilities that ran successfully.
    pub fn release_count(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }

    pub fn pool_listener_count(&self) -> usize {
        self.shared.pool_listeners.len()
    }

    /// Listeners bound on the connection with the given id.
    pub fn connection_listener_count(&self, connection_id: usize) -> usize {
        self.client(connection_id)
            .map(|client| client.listeners.len())
            .unwrap_or(0)
    }

    /// Simulate an idle pooled connection dropping.
    pub fn emit_pool_error(&self, err: &NativeError) {
        self.shared.pool_listeners.emit(err);
    }

    /// Simulate the connection with the given id failing while leased.
    pub fn emit_connection_error(&self, connection_id: usize, err: &NativeError) {
        if let Some(client) = self.client(connection_id) {
            client.listeners.emit(err);
        }
    }

    fn client(&self, connection_id: usize) -> Option<Arc<InMemoryTestClient>> {
        self.shared
            .clients
            .lock()
            .unwrap()
            .get(connection_id)
            .cloned()
    }

    /// Assert that the last query matches the expected SQL and parameters.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[SqlValue]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.params, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.params
        );
    }

    /// Assert that exactly n queries were executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.shared.recorded_queries.lock().unwrap().len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }
}

impl Default for InMemoryTestConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NativeConnector for InMemoryTestConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> std::result::Result<ConnectionHandle, NativeError> {
        self.shared.connects.lock().unwrap().push(config.clone());
        if let Some(err) = self.shared.connect_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut clients = self.shared.clients.lock().unwrap();
        let client = Arc::new(InMemoryTestClient {
            id: clients.len(),
            shared: Arc::clone(&self.shared),
            listeners: ListenerSet::new(),
            released: AtomicBool::new(false),
        });
        clients.push(Arc::clone(&client));
        drop(clients);

        let lease = Arc::clone(&client);
        let release_failure = self.shared.release_failure.lock().unwrap().clone();
        Ok(ConnectionHandle::new(
            client,
            Box::new(move || {
                if let Some(err) = release_failure {
                    return Err(err);
                }
                lease.released.store(true, Ordering::SeqCst);
                lease.shared.releases.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ))
    }

    fn on_pool_error(&self, listener: ErrorListener) {
        self.shared.pool_listeners.add(listener);
    }
}

/// A client handed out by [`InMemoryTestConnector`].
pub struct InMemoryTestClient {
    id: usize,
    shared: Arc<Shared>,
    listeners: ListenerSet,
    released: AtomicBool,
}

#[async_trait]
impl NativeClient for InMemoryTestClient {
    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<RawQueryResult, NativeError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(NativeError::message(
                "Client was released and is not queryable",
            ));
        }

        // Record the query
        self.shared
            .recorded_queries
            .lock()
            .unwrap()
            .push(RecordedQuery {
                connection_id: self.id,
                sql: sql.to_string(),
                params: params.to_vec(),
            });

        // Return next queued response, then the responder, then the default
        if let Some(response) = self.shared.responses.lock().unwrap().pop_front() {
            return response;
        }
        let responder = self.shared.responder.lock().unwrap().clone();
        match responder {
            Some(responder) => responder(sql, params),
            None => Ok(self.shared.default_response.lock().unwrap().clone()),
        }
    }

    fn on_error(&self, listener: ErrorListener) {
        self.listeners.add(listener);
    }
}

/// Builder for creating test responses easily.
pub struct InMemoryTestResponseBuilder {
    command: String,
    row_count: Option<u64>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            command: "SELECT".to_string(),
            row_count: None,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Set the command tag. Defaults to "SELECT".
    pub fn command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    /// Override the row count. Defaults to the number of rows added.
    pub fn row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    /// Set the column names for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of values in column order.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Build the RawQueryResult.
    pub fn build(self) -> RawQueryResult {
        let row_count = self.row_count.unwrap_or(self.rows.len() as u64);
        let rows = self
            .rows
            .into_iter()
            .map(|values| Row::new(&self.columns, values))
            .collect();
        RawQueryResult::new(self.command, row_count, self.columns, rows)
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
