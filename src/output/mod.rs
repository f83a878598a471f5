pub mod cli;
pub mod report;

pub use cli::CliOutput;
pub use report::{Report, ReportController, ReportEntry, ReportError, ReportFormat};
