mod ingest;
mod scheduler;

pub use scheduler::FetchScheduler;
