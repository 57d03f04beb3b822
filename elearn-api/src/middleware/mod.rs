/// Middleware for the API server
///
/// Authentication is a `from_fn` layer in [`crate::app`]; this module holds
/// the reusable tower layers.

pub mod security;
