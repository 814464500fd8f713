//! Cache key names

/// The single bank list entry shared by the whole process
pub const BANK_LIST: &str = "baokim:bank_list";
