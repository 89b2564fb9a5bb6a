mod field;
mod reference;
mod table;

pub use field::{Field, FieldType};
pub use reference::{contains_partition_decorator, TableReference};
pub use table::TableSchema;
