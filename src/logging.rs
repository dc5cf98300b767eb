//! Console logger setup for binaries, examples, and tests. The library
//! itself never calls this implicitly; callers own their own logger.

use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Initialize a `simple_logger` console sink at `level`. Safe to call more
/// than once; subsequent calls are ignored rather than panicking, since
/// test binaries may each try to set up logging independently.
pub fn init_logging(level: LevelFilter) {
    let _ = SimpleLogger::new().with_level(level).init();
}

/// Convenience entry point matching the teacher's default of info-level
/// console output.
pub fn init_default_logging() {
    init_logging(LevelFilter::Info);
}
