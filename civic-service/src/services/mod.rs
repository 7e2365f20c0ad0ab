pub mod auth;
pub mod database;
pub mod email;
pub mod identity;
pub mod jwt;
pub mod storage;
pub mod verification;

pub use auth::AuthService;
pub use database::MongoDb;
pub use email::{EmailProvider, LogEmailProvider, SmtpEmailProvider};
pub use identity::{IdentityService, OAuthProfile};
pub use jwt::{Claims, JwtService};
pub use storage::{CloudinaryStorage, ObjectStorage, UnconfiguredStorage};
pub use verification::VerificationEngine;
