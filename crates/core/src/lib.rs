pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod query;

pub use catalog::{ColumnKind, SchemaCatalog};
pub use domain::customer::{CustomerDetails, CustomerId};
pub use domain::invoice::{
    DiscountItem, InvoiceDetails, InvoiceId, InvoicePayload, LineItem, ProductId,
};
pub use errors::{DispatchError, InvalidSchemaReference};
pub use query::{
    CompiledQuery, Condition, ConditionValue, QueryBuilder, QueryDescriptor, ScalarValue,
    SortDirection,
};
