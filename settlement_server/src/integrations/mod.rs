pub mod catalog;
pub mod flutterwave;
pub mod notifications;
