//! Statement execution for warehouse-exec.
//!
//! The `ExecutionGateway` owns one driver and runs every statement through
//! the retry loop in `retry`. Script handling and warehouse conveniences are
//! further `ExecutionGateway` methods in `script` and `warehouse`.

pub mod executor;
pub mod retry;
pub mod script;
mod warehouse;

pub use executor::{
    ExecuteOptions, ExecutionGateway, GatewayOptions, QueryOptions, SessionSettings,
    StreamOptions,
};
pub use retry::{
    Attempt, AttemptState, ClassifiedFailure, RecordingSleeper, RetryExecutor, Sleeper,
    ThreadSleeper, MAX_RETRIES,
};
pub use script::ScriptOptions;
