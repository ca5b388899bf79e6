//! Adapters for the domain ports: in-memory stores (default), RocksDB stores
//! behind the `storage-rocksdb` feature, a local Ed25519 signer and a dry-run
//! transfer rail for rehearsals.

pub mod in_memory;
pub mod rail;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod signer;
