mod run_logs;
mod runs;

pub use run_logs::RunLogRepository;
pub use runs::RunRepository;
