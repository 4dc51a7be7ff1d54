//! Everything that talks to eBay: the OAuth credential exchange, the cached
//! credential and the Browse API client that uses it.

pub mod catalog;
pub mod credential;
pub mod issuer;

pub use catalog::CatalogClient;
pub use credential::{Credential, CredentialCache};
pub use issuer::{HttpTokenIssuer, TokenIssuer};
