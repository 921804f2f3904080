//! The signed-in user's own profile, academic records and portfolio.

pub mod handlers;
