pub mod aggregate;
pub mod best_hit;
pub mod processor;
pub mod report;

pub use aggregate::{AbundanceAggregator, AbundanceTables};
pub use processor::{SampleInputs, SampleProcessor};
pub use report::{generate_report, RunSummary};
