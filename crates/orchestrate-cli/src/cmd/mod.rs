pub mod deploy;
pub mod runs;
