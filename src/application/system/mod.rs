pub mod cancellation;

pub use cancellation::CancellationFlag;
