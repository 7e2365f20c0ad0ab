pub mod auth;
pub mod issues;
pub mod oauth;
pub mod organization;
pub mod rankings;
pub mod transport;
