pub mod assessment;
pub mod builder;
pub mod cancel;
pub mod context;
pub mod defaults;
pub mod result;
pub mod runtime;
pub mod state;
pub(crate) mod timeout;
pub mod traits;
