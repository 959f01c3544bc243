//! HTTP control surface for reading and updating compaction state

pub mod handlers;
pub mod routes;

pub use handlers::{
    ApiError, CompactionState, FilterRequest, FilterResponse, ObserveRequest, ObserveResponse,
};
pub use routes::build_router;
