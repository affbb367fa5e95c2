//! Sealer abstraction and implementations.
//!
//! The benchmark drives every sealing and proof-of-storage operation through the
//! [`Sealer`] trait. [`ExternalSealer`] delegates to a proof-library executable;
//! [`MockSealer`] produces deterministic artifacts for tests and dry runs.

mod external;
mod mock;
mod select;
mod traits;

pub use external::{ExternalSealer, ExternalSealerConfig};
pub use mock::{MockCall, MockConfig, MockOp, MockSealer};
pub use select::{SealerKind, SealerSettings};
pub use traits::Sealer;
