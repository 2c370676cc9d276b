// FFI boundary (§4.2, §6.1): the only module in this crate marked
// `extern "C"`. Everything else is plain safe Rust driven through
// `lib.rs`'s public functions; this module is a thin, panic-proof shell
// around it for non-Rust callers.

pub mod c_api;
pub mod types;
