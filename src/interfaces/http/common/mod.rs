pub mod error;
pub mod validated_json;

pub use error::{ApiError, ErrorBody, ErrorDetail};
pub use validated_json::ValidatedJson;
