//! Repository layer — entity-scoped database operations.
//!
//! All functions operate on `&Connection`; transactions are managed by the
//! callers that need multi-statement atomicity.

mod batches;
mod clinical;
mod decisions;
mod documents;
mod extractions;
mod patients;
mod reference;
mod templates;

pub use batches::*;
pub use clinical::*;
pub use decisions::*;
pub use documents::*;
pub use extractions::*;
pub use patients::*;
pub use reference::*;
pub use templates::*;
