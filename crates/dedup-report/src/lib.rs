pub mod format;
pub mod report;

pub use format::sizeof_fmt;
pub use report::generate_script;
