/// Between suite, file path, test path and params
pub const BIG_SEPARATOR: char = ':';
/// Between parts of a file or test path
pub const PATH_SEPARATOR: char = ',';
/// Between `key=value` params
pub const PARAM_SEPARATOR: char = ';';
/// Between a param key and its value
pub const PARAM_KV_SEPARATOR: char = '=';
/// Trailing "and everything below"
pub const WILDCARD: char = '*';
