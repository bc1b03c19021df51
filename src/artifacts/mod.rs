//! Data structures and algorithms
//!
//! - `objects`: content-addressed object types (blob, tree, commit)
//! - `branch`: ref names and revision expressions
//! - `index`: staging entry types and binary format constants
//! - `log`: commit history traversal
//! - `merge`: LCA finding and memory-type-aware three-way merge
//! - `pack`: pack files, side indices, delta codec
//! - `similarity`: tiered delta-candidate selection
//! - `crypto`: Merkle trees, Ed25519 signing, encryption at rest
//! - `audit`: hash-chained operation journal
//! - `trust`: key trust levels
//! - `remote`: transport abstraction and fetch/push protocol
//! - `gc`: mark-and-sweep reachability
//! - `fsck`: end-to-end integrity verification
//! - `memory`: memory-class derivation
//! - `config`: enumerated repository configuration

pub mod audit;
pub mod branch;
pub mod config;
pub mod crypto;
pub mod fsck;
pub mod gc;
pub mod index;
pub mod log;
pub mod memory;
pub mod merge;
pub mod objects;
pub mod pack;
pub mod remote;
pub mod similarity;
pub mod trust;
