pub mod browserless_session;
pub mod util;

pub use browserless_session::BrowserlessSession;
