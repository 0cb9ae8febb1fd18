//! Query helpers shared by the repositories

pub mod managed;
pub mod params;

pub use managed::translate;
pub use params::QueryParams;
