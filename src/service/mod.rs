pub mod authorization;
pub mod browser;
pub mod classifier;

pub use authorization::{DatabaseFilter, filter_databases};
pub use browser::BrowserService;
pub use classifier::{LeadingKeyword, StatementClassifier};
