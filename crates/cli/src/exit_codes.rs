//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | General error (unspecified)                              |
//! | 2    | CLI usage error (bad args, unknown step, bad override)   |
//! | 3    | Invalid config (`relink.toml` or step plan)              |
//! | 4    | Completed, but some rows are in the unmatched report     |
//! | 5    | Completed, but some rows failed                          |
//! | 6    | A step aborted (dump missing); dependents skipped        |
//! | 7    | Mapping or target store failure                          |
//!
//! When several apply, the highest code wins.

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown step name, unreadable override file.
pub const EXIT_USAGE: u8 = 2;

/// Config parse or validation failure, including dependency cycles.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Warning: rows could not be linked and were written to the unmatched report.
pub const EXIT_UNMATCHED: u8 = 4;

/// One or more rows failed (missing identifier, vanished target, store error).
pub const EXIT_ROW_ERRORS: u8 = 5;

/// A step aborted because its dump file is missing.
pub const EXIT_STEP_ABORTED: u8 = 6;

/// Cannot open or write the mapping database or the target store.
pub const EXIT_STORE: u8 = 7;
