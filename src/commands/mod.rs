mod auth;
mod duration;
mod handlers;
mod registry;

pub use registry::CommandRegistry;
