//! Argument validation shared by the command layer.
//!
//! - **Intervals**: `agg` periods such as `"1m"` or `"1h30m"`
//! - **Feed URLs**: scheme, host and private-address checks for `addfeed`

mod duration;
mod url_validator;

pub use duration::{parse_interval, IntervalError};
pub use url_validator::{validate_url, UrlValidationError};
