//! Database layer for the Annie call bridge.
//!
//! Provides SQLite connection pooling, embedded schema migrations, and the
//! store operations a bridged call performs: reading call, patient, and
//! organization context, and recording lifecycle, transcript, and emergency
//! events.

pub mod calls;
pub mod emergency;
pub mod error;
pub mod migrations;
pub mod pool;

pub use calls::{
    append_transcript, format_timestamp, get_call, get_organization, get_patient,
    mark_call_ended, mark_call_failed, mark_call_started, parse_timestamp, CallRecord,
};
pub use emergency::{record_emergency, NewEmergencyEvent};
pub use error::StoreError;
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
