pub mod ai_response;
pub mod fairness;
pub mod recommendation;
pub mod requests;
pub mod usage;

pub use ai_response::*;
pub use fairness::*;
pub use recommendation::*;
pub use requests::*;
pub use usage::*;
