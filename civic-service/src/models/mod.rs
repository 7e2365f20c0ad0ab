pub mod account;
pub mod issue;
pub mod transport;

pub use account::{
    Account, AuthProvider, Profile, PublicAccount, Role, VerificationChallenge,
};
pub use issue::{Issue, SolvedIssue};
pub use transport::{TransportEntry, TransportQueryLog, TransportType};
