//! redb table definitions for the AppMirror entity store.
//!
//! Record tables use `&str` keys (the record id) and `&[u8]` values
//! (JSON-serialized domain types).

use redb::TableDefinition;

/// Shape shared by every record table.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Devices keyed by `{device_id}`.
pub const DEVICES: RecordTable = TableDefinition::new("devices");

/// Builds keyed by `{build_id}`.
pub const BUILDS: RecordTable = TableDefinition::new("builds");

/// Upload order of builds: insertion sequence → `{build_id}`.
pub const BUILD_ORDER: TableDefinition<u64, &str> = TableDefinition::new("build_order");

/// Sessions keyed by `{session_id}`.
pub const SESSIONS: RecordTable = TableDefinition::new("sessions");
