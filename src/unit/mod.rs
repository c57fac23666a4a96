//! Storage Unit Module
//!
//! A storage unit is one addressable partition of a partition key. It holds
//! its entities in sort key order, keeps an exact size counter and asks for a
//! sibling once it fills up.
//!
//! ## Core Concepts
//! - **Write lock**: inserts, batches and the scaling decision run under one
//!   async lock per unit, so a batch behaves exactly like the same inserts
//!   issued one at a time.
//! - **Autoscaling**: `AutoscalingController` creates at most one sibling per
//!   unit through the index; the `RedirectPolicy` decides whether the unit
//!   keeps accepting writes afterwards.
//! - **Access**: handlers expose the unit over HTTP by address.

pub mod autoscaler;
pub mod handlers;
pub mod protocol;
pub mod storage;

#[cfg(test)]
mod tests;
