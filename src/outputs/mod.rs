//! Output generation for acquired data.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 2025-06-07.json     # one snapshot per run date
//! └── history.json        # cumulative date -> index series for charting
//! ```

pub mod json;
