pub mod academic;
pub mod portfolio;
pub mod profile;
