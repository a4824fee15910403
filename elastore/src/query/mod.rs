//! Query compilation and execution

pub mod builder;
pub mod translator;

pub use builder::{Callback, QueryBuilder};
pub use translator::{
    BoolClauses, Predicate, QueryTranslator, RangeFilter, Translation, TranslatorOptions,
    EPOCH_MILLIS,
};
