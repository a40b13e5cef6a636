//! CLI Commands

pub mod check;
pub mod propose;

pub use check::run as check;
pub use propose::run as propose;
