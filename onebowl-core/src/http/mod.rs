//! Outbound page fetching.
//!
//! Every request goes through an [`HttpClient`]. The production client only
//! accepts URLs that already passed the SSRF guard, connects to the addresses
//! the guard approved, and re-validates each redirect hop.

mod client;

pub use client::{redirect_target, HttpClient, MockClient, MockResponse, SafeClient};
