pub mod price_loader;

pub use price_loader::{InputFormat, load_path, parse_str};
