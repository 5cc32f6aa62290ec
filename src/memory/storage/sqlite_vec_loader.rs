//! Registration of the sqlite-vec extension.
//!
//! The only unsafe code in the crate lives here.

use std::sync::Once;

use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;

type SqliteExtensionFn =
    unsafe extern "C" fn(*mut sqlite3, *mut *mut i8, *const sqlite3_api_routines) -> i32;

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto-loaded extension for every new connection.
///
/// Connections opened before this call do not see the vector functions, so
/// call it at startup before constructing a [`super::SqliteChunkStore`].
/// Repeated calls are no-ops.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    REGISTER.call_once(|| {
        // SAFETY: sqlite3_auto_extension only records the entry point;
        // sqlite3_vec_init has the extension-init signature SQLite expects.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteExtensionFn>(
                sqlite3_vec_init as *const (),
            )));
        }
    });
}
