//! # Core Module
//!
//! The stateless foundation of the library: the data model of problems, DataPoints and
//! analyses ([`models`]) and the file formats they are saved to and exported in ([`io`]).
//!
//! Nothing in this layer runs jobs or decides which points to evaluate; that belongs to
//! [`crate::engine`].

pub mod io;
pub mod models;
