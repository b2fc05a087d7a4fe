//! The columnar batch model.
//!
//! Every operator consumes and produces [`TupleVector`] batches. A batch
//! holds one [`ValueVector`] per column; vectors expose coercing scalar
//! accessors and a per-row null indicator. Filtered views
//! ([`SelectionVector`], [`BitSetVector`], the predicated/populated view
//! constructors in [`predicated`]) share the backing vectors and remap
//! rows without copying.

mod bitset;
pub mod predicated;
mod tuple_vector;
mod value;
mod value_vector;

pub use bitset::BitSetVector;
pub use predicated::{RowMap, SelectionVector};
pub use tuple_vector::{schema_of, TupleVector};
pub use value::{NormalizedKey, Value};
pub use value_vector::{ConstantVector, TypedVector, ValueVector, VectorRef};
