//! Validators applied to signed URLs after issuance.

pub mod http_probe;
pub mod safety;

pub use http_probe::HttpProbe;
pub use safety::UrlSafetyValidator;
