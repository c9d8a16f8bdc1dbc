//! Browser front end for the exbert core (Leptos CSR on wasm32).
//!
//! Without `--features web` on a wasm32 target this crate compiles to a stub,
//! so `cargo test` at the workspace root needs no wasm toolchain.

#[cfg(not(all(feature = "web", target_arch = "wasm32")))]
pub fn placeholder() {}

#[cfg(all(feature = "web", target_arch = "wasm32"))]
mod web;

#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub use web::start;
