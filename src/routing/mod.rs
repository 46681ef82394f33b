//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (any task, any time):
//!     RouteConfig
//!     → router.rs (instrument if asked, lock writers)
//!     → table.rs (clone current table + add route, or reject)
//!     → publish new table (ArcSwap::store)
//!
//! Dispatch (per request, no lock):
//!     Request
//!     → Mux (load current table)
//!     → matched handler | 301 trailing slash | 405 + Allow | 404
//! ```
//!
//! # Design Decisions
//! - Conflicting registrations are errors, never silent overrides
//! - Path patterns use `{name}` and `{*rest}` captures (radix tree lookup)
//! - Every `Mux` clone observes the latest published table

pub mod router;
pub mod table;

pub use router::{Methods, RouteConfig, RouteError, Router};
pub use table::Mux;
