pub mod errors;
pub mod js;

pub use errors::to_tab_error;
