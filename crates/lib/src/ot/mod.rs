//! Operational transformation algebra.
//!
//! Every shared object is edited through operations that can be applied,
//! composed (sequential edits merged into one) and transformed (concurrent
//! edits rewritten so that both orders of application converge):
//!
//! * [`StringOp`] and [`ListOp`]: retain/insert/delete sequence edits
//! * [`MapOp`]: per-key changes carrying the old and new value
//! * [`Operation`]: a bundle of per-object updates keyed by object id
//!
//! All three satisfy the transform property: for concurrent `a` and `b` based on
//! the same state with `(a', b') = a.transform(&b)`, applying `a` then `b'`
//! gives the same result as applying `b` then `a'`.

use std::fmt;

use serde::{Deserialize, Serialize};

mod combined;
pub mod errors;
mod map;
mod sequence;
mod value;

pub use combined::{ObjectOp, Operation, Update};
pub use errors::OtError;
pub use map::{MapChange, MapOp};
pub use sequence::{Component, ListOp, Sequence, SequenceOp, StringOp};
pub use value::{ObjectRef, Value};

/// The kind of a shared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Map,
    List,
    String,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectType::Map => "map",
            ObjectType::List => "list",
            ObjectType::String => "string",
        };
        f.write_str(name)
    }
}

/// Argument position in `transform(left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Which argument of a transform wins when both sides touch the same spot.
///
/// For sequences the winning insert is placed first; for maps the winning
/// write survives and the other is dropped. Every participant in a session
/// must agree on this constant.
pub const TIE_BREAK: Side = Side::Left;
