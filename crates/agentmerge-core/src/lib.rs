pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod paths;
pub mod report;
pub mod store;
pub mod task;
pub mod vcs;

pub use config::Settings;
pub use error::{Error, Result};
pub use events::{ChannelSink, EventSink, LogSink, MergeEvent, NoopSink};
pub use paths::PathFilter;
pub use report::{ConflictRecord, FileOutcome, MergeReport, ResolverStats, RunStatus};
pub use store::ReportStore;
pub use task::{TaskRequest, TaskSnapshot};
pub use vcs::{GitCli, VersionControl};
