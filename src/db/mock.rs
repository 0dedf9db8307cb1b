//! Mock driver for testing.
//!
//! Replays scripted responses in order and records every call so tests can
//! assert on what reached the "server". A `MockHandle` shares the state with
//! the driver after the driver has been boxed into a gateway.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::cursor::{Cursor, TextCursor, TextRow};
use super::types::ColumnMeta;
use super::Driver;
use crate::error::DriverError;

/// A scripted answer to the next driver call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Statement succeeded with this affected-row count.
    Update(Option<u64>),
    /// Query succeeded with these rows.
    Rows {
        columns: Vec<ColumnMeta>,
        rows: Vec<TextRow>,
    },
    /// The call fails.
    Fail(DriverError),
}

impl MockResponse {
    /// A failure with a server-side error message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(DriverError::database(message))
    }

    /// A query result.
    pub fn rows(columns: Vec<ColumnMeta>, rows: Vec<TextRow>) -> Self {
        Self::Rows { columns, rows }
    }
}

/// A call observed by the mock driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Update(String),
    Query(String),
    AutoCommit(bool),
    Stream { sql: String, fetch_size: usize },
    Close,
}

#[derive(Debug)]
struct MockState {
    responses: VecDeque<MockResponse>,
    sticky_failure: Option<DriverError>,
    calls: Vec<MockCall>,
    auto_commit: bool,
    closed: bool,
}

/// A driver that answers from a script instead of a server.
#[derive(Debug)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

/// Shared view of a `MockDriver`'s script and call log.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Creates a mock driver with an empty script.
    ///
    /// Unscripted statements report 0 affected rows and unscripted queries
    /// return no rows.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: VecDeque::new(),
                sticky_failure: None,
                calls: Vec::new(),
                auto_commit: true,
                closed: false,
            })),
        }
    }

    /// Returns a handle sharing this driver's state.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    fn next_response(&self, call: MockCall) -> Result<Option<MockResponse>, DriverError> {
        let mut state = self.state();
        state.calls.push(call);

        if state.closed {
            return Err(DriverError::protocol("This connection has been closed."));
        }
        if let Some(err) = &state.sticky_failure {
            return Err(err.clone());
        }

        match state.responses.pop_front() {
            Some(MockResponse::Fail(err)) => Err(err),
            other => Ok(other),
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockHandle {
    /// Appends a response to the script.
    pub fn push(&self, response: MockResponse) -> &Self {
        lock(&self.state).responses.push_back(response);
        self
    }

    /// Appends a server error with the given message.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(MockResponse::fail(message))
    }

    /// Makes every subsequent call fail with `error`, regardless of the script.
    pub fn fail_always(&self, error: DriverError) {
        lock(&self.state).sticky_failure = Some(error);
    }

    /// Stops failing every call.
    pub fn recover(&self) {
        lock(&self.state).sticky_failure = None;
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.state).calls.clone()
    }

    /// SQL of every statement and query sent so far, in order.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Update(sql) | MockCall::Query(sql) => Some(sql.clone()),
                MockCall::Stream { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of scripted responses not yet consumed.
    pub fn pending(&self) -> usize {
        lock(&self.state).responses.len()
    }

    pub fn auto_commit(&self) -> bool {
        lock(&self.state).auto_commit
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl Driver for MockDriver {
    fn execute_update(&mut self, sql: &str) -> Result<Option<u64>, DriverError> {
        match self.next_response(MockCall::Update(sql.to_string()))? {
            Some(MockResponse::Update(count)) => Ok(count),
            Some(MockResponse::Rows { rows, .. }) => Ok(Some(rows.len() as u64)),
            _ => Ok(Some(0)),
        }
    }

    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError> {
        match self.next_response(MockCall::Query(sql.to_string()))? {
            Some(MockResponse::Rows { columns, rows }) => {
                Ok(Box::new(TextCursor::new(columns, rows)))
            }
            _ => Ok(Box::new(TextCursor::default())),
        }
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        let mut state = self.state();
        state.calls.push(MockCall::AutoCommit(enabled));
        state.auto_commit = enabled;
        Ok(())
    }

    fn open_streaming_cursor(
        &mut self,
        sql: &str,
        fetch_size: usize,
    ) -> Result<Box<dyn Cursor + '_>, DriverError> {
        if self.state().auto_commit {
            return Err(DriverError::protocol(
                "Cursor based results require auto-commit to be disabled",
            ));
        }

        let call = MockCall::Stream {
            sql: sql.to_string(),
            fetch_size,
        };
        match self.next_response(call) {
            Ok(Some(MockResponse::Rows { columns, rows })) => {
                Ok(Box::new(TextCursor::new(columns, rows)))
            }
            Ok(_) => Ok(Box::new(TextCursor::default())),
            Err(err) => {
                self.state().auto_commit = true;
                Err(err)
            }
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut state = self.state();
        state.calls.push(MockCall::Close);
        state.closed = true;
        Ok(())
    }
}
