//! Route definitions and their textual form
//!
//! This library defines:
//! - Route: a named routing rule (predicates, filters, backend)
//! - The definition codec: rendering a route to text and parsing a
//!   `;`-separated document of definitions back into routes

pub mod codec;
pub mod error;
pub mod route;

pub use codec::{parse_batch, parse_route};
pub use error::{CodecError, Result};
pub use route::{Arg, Backend, Call, Route};
