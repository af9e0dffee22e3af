//! wirekit
//!
//! An embeddable async HTTP client core: declarative request/client composition,
//! a pluggable transport loader, an ordered validator/retry pipeline, and an
//! in-process request stubber.
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod loader;
pub mod request;
pub mod response;
pub mod stub;
pub mod util;
pub mod validator;

pub use client::{Client, ClientBuilder};
pub use error::HttpError;
pub use request::body::BodyDescriptor;
pub use request::{Request, RequestBuilder, TransferMode};
pub use response::{Metrics, Progress, Response};
