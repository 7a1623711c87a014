mod error;
pub use error::*;

mod pem;
pub use pem::*;

mod ber;

mod anchor;
pub use anchor::*;

mod pkcs7;
pub use pkcs7::*;

mod verifier;
pub use verifier::*;

mod fetch;
pub use fetch::*;

mod pipeline;
pub use pipeline::*;

mod doc;
pub use doc::*;
