//! Test parameters: values, merging, and lazy combinatorial builders.

mod builder;
mod utils;
mod value;

pub use builder::{
    unit_params, CaseIter, CaseParamsBuilder, ParamsPipeline, SubcaseIter, SubcaseParamsBuilder,
    Subcases,
};
pub use utils::{
    extract_public_params, merge_params, param_key_is_public, public_params_equals,
    PRIVATE_PARAM_PREFIX,
};
pub use value::{ParamValue, Params};
