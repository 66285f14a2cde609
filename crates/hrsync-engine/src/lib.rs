//! hrsync engine - pull and push runs between two connectors
//!
//! - `PullJob` pages through an origin from a cursor and writes each page to
//!   a target, returning the cursor to resume from
//! - `PushJob` writes records named by change events, or given explicitly,
//!   and reports what happened in a `PushResult`
//! - `formatter` decides per batch between an explicit formatter and the
//!   unified model
//! - `config` holds the JSON run configurations used by the CLI and server

pub mod config;
pub mod formatter;
pub mod pull;
pub mod push;

pub use config::{parse_events, run_pull, run_push, PullConfig, PushConfig};
pub use formatter::{
    assign_mapping, format_batch, write_formatted, FormatOutput, FormattedBatch, Formatter,
    FormatterStore, MappingFormatter, MappingSpec,
};
pub use pull::{PullJob, DEFAULT_BATCH_SIZE};
pub use push::{PushInput, PushJob, PushMode, PushResult};
