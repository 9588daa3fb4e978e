use std::error::Error;

pub mod address;
pub mod api;
pub mod capture;
pub mod config;
pub mod dom;
pub mod error;
pub mod handler;
pub mod model;
pub mod page;
pub mod restore;
pub mod routes;
pub mod store;
pub mod sync;

pub use routes::routes;

pub fn unpack_error(err: &dyn Error) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
