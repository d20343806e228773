pub mod probe;
pub mod session;
pub mod shared;

pub use probe::ChromiumProbe;
pub use session::{ChromiumBrowser, ChromiumTab};
