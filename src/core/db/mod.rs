/// Database Module
///
/// The data-access plumbing between compiled statements and SQLite.
///
/// ## Architecture
///
/// - **Connection Pool** (`pool.rs`): r2d2-backed, bounded set of connections leased per operation
/// - **Driver** (`driver.rs`): runs one statement and reports the raw, possibly nested, result shape
/// - **Procedure Catalog** (`procedure.rs`): hosts the `CALL` routines SQLite lacks natively
/// - **Dispatcher** (`dispatcher.rs`): leases, executes, releases and flattens
///
/// ## Error Handling
///
/// All operations return the crate-wide `ClubhouseError`; driver failures
/// that signal a uniqueness conflict are classified separately.
pub mod dispatcher;
pub mod driver;
pub mod pool;
pub mod procedure;

pub use dispatcher::{flatten, Dispatcher, PendingResult, StatementResult};
pub use driver::{RawResult, StatementKind, WriteStatus};
pub use pool::{ConnectionOptions, ConnectionPool, PoolConfig, PoolStatus, PooledConnection, MEMORY_PATH};
pub use procedure::{ProcedureCatalog, ProcedureDefinition};
