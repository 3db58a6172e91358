pub mod fixtures;
pub mod session;

pub use fixtures::seeded_remote;
pub use session::TestSession;
