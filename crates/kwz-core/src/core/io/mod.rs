pub mod cycle_log;
pub mod lmpdat;
pub mod lmplog;
