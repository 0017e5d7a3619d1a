//! Report writers.
//!
//! # Submodules
//!
//! - [`json`]: writes a [`TieredReport`](crate::models::TieredReport) as JSON
//!   for downstream tools
//! - [`markdown`]: renders the same report as a readable Markdown document
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 3/
//!     └── 2025-10-11.json
//!
//! markdown_output_dir/
//! └── 3/
//!     └── 2025-10-11.md
//! ```

pub mod json;
pub mod markdown;
