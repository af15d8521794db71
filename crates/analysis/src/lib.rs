//! Strategy calculations: BCG growth-share classification, Porter's five
//! forces scoring, SWOT passthrough and the heuristic SWOT suggester.
//!
//! Everything here is pure and infallible for validated input.

pub mod bcg;
pub mod porter;
pub mod suggest;
pub mod swot;
pub mod validate;

pub use bcg::{classify_bcg, BcgPoint, ProductInput, Quadrant};
pub use porter::{forces_index, ForceIntensities, ForcesScore};
pub use suggest::{suggest_swot, MarketContext, ProductContext, SuggestSwotRequest};
pub use swot::{build_swot, Swot};
pub use validate::{FieldError, Validate, ValidationError};
