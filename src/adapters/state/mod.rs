#[cfg(feature = "lambda")]
pub mod dynamo;
#[cfg(feature = "cli")]
pub mod local;

#[cfg(feature = "lambda")]
pub use dynamo::DynamoStateStore;
#[cfg(feature = "cli")]
pub use local::LocalStateStore;
