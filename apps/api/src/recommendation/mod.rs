// Major recommendation: feature building, the external model client, and the
// refresh workflow that stores its answer.

pub mod client;
pub mod features;
pub mod handlers;
pub mod majors;
pub mod workflow;
