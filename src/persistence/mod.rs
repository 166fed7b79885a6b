// Persistence module for TDengine integration
pub mod tdengine;

pub use tdengine::TDengineTableStore;
