mod driver;

pub use driver::{NativeClient, NativeConnector};
