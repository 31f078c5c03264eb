pub mod credentials;

pub use credentials::{mask_credential, CredentialRecord, CredentialStatus, CredentialStore};
