//! Point-of-sale plugins.
//!
//! Each plugin takes a shared `PosStore` handle and starts inactive.

pub mod customer_lookup;
pub mod employee_tracker;
pub mod purchase_recommender;
mod support;

pub use customer_lookup::CustomerLookup;
pub use employee_tracker::EmployeeTracker;
pub use purchase_recommender::PurchaseRecommender;
