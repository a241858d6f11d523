pub mod envelope;

pub use envelope::{Envelope, ResponseTriple};
