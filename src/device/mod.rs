pub mod connection;
pub mod constants;
pub mod frame;
pub mod machine;
pub mod scan;
pub mod transport;
pub mod types;
