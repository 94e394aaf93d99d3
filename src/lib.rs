pub mod adj_pass_model;
pub mod advi;
pub mod config;
pub mod count_model;
pub mod dispatch;
pub mod error;
pub mod expected_model;
pub mod export;
pub mod fit;
pub mod model_book;
pub mod per90_model;
pub mod radar;
pub mod samples;
pub mod special;
pub mod success_model;
pub mod summarize;
pub mod table;

pub use config::FitConfig;
pub use dispatch::{EstimatorKind, ModelInput, estimate};
pub use error::{ModelError, Result};
pub use fit::{ModelFit, ModelKind};
pub use model_book::{ModelBook, ModelRequest, Operand};
pub use summarize::{PlayerSummary, summarize, summarize_all};
pub use table::PlayerTable;
