//! Общая система ошибок busfeed.
//!
//! - `status_code`: числовые коды для категоризации ошибок;
//! - `ext`: трейт [`ErrorExt`], который реализуют все доменные ошибки;
//! - `types`: ошибки загрузки снимков, доставки подписчикам и отмены.

pub mod ext;
pub mod status_code;
pub mod types;

// Publicly re-export all error types and functions from the submodules to
// simplify access from external code.
pub use ext::*;
pub use status_code::*;
pub use types::*;
