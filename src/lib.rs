pub mod aggregate;
pub mod batch;
pub mod config;
pub mod diffusion;
pub mod error;
pub mod ico;
pub mod job;
pub mod msd;
pub mod mto;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod series;
pub mod settling;
pub mod statistics;
pub mod table;
pub mod trajectory;

pub use error::{AnalysisError, Result};
