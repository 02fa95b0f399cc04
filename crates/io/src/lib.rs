// File I/O for legacy migration: dump parsing, id mapping, reports, overrides

pub mod dump;
pub mod mapping;
pub mod overrides;
pub mod unmatched;

pub use dump::{parse_file, parse_str, ParseOutput, ParseWarning, SourceRow, Value};
pub use mapping::{MappingEntry, MappingError, MappingStore, SetOutcome};
pub use overrides::{ManualOverrides, OverrideError};
pub use unmatched::{ReportError, UnmatchedReport, UnmatchedRow};
