pub mod claims;
pub mod login;
pub mod session;

pub use login::{admin_login, establish_session, handle_logout, handle_me};
