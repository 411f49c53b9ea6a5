mod kobo;

pub mod helpers;
pub mod op;
mod secret;

pub use kobo::{Kobo, KoboConversionError, CURRENCY_CODE};
pub use secret::Secret;
