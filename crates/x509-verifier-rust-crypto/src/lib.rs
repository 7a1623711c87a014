mod cert;
pub mod constants;
pub use cert::*;
mod sign;
pub use sign::*;

// re-exports
pub use x509_parser;
