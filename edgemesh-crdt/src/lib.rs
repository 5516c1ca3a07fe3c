//! CRDT implementations for edgemesh replicas.
//!
//! This crate provides the Conflict-free Replicated Data Types a node's
//! replica is built from:
//!
//! - [`GCounter`] — grow-only counter, one slot per node
//! - [`LwwRegister`] — Last-Writer-Wins register for the latest reading
//! - [`OrSet<T>`] — Observed-Remove Set for the event collection
//!
//! All CRDTs in this crate satisfy the following properties:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! These properties ensure that replicas converge to the same state no
//! matter in which order (or how often) gossip delivers the same updates.
//!
//! All internal maps are ordered (`BTreeMap`/`BTreeSet`) so that serializing
//! a CRDT yields canonical JSON — the Merkle fingerprint depends on it.

mod gcounter;
mod lww_register;
mod orset;

pub use gcounter::GCounter;
pub use lww_register::LwwRegister;
pub use orset::OrSet;
