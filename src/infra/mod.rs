//! Infrastructure: filesystem hashing and signed-manifest loading.

pub mod hasher;
pub mod signature;
