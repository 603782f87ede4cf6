//! Data models shared by the session store and the API client.
//!
//! - `Session`: the authenticated identity carried in the signed cookie
//! - `Role`: account role (job seeker or employer side)
//! - `UserProfile`, `Credentials`: backend login exchange payloads

pub mod user;

pub use user::{Credentials, Role, Session, UserProfile};
