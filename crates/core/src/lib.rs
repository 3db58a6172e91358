pub mod datetime;
pub mod error;
pub mod field;
pub mod field_value;
pub mod filter;
pub mod marshal;
pub mod row;

pub use error::CoreError;
pub use field::{FieldSchema, FieldType, Schema, SelectionOption};
pub use field_value::FieldValue;
pub use filter::{Criterion, Filter, FilterTerm, LogicalOperator};
pub use row::{Row, RowListener};
