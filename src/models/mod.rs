mod document;
mod path;
mod telemetry;
mod validators;

pub use document::*;
pub use path::*;
pub use telemetry::*;
pub use validators::*;
