pub mod upload;
pub mod validation;

pub use upload::analyze_report;
