/// URL prefix under which artifacts are served.
pub const PUBLIC_PREFIX: &str = "/certs";

/// Suffix for in-flight artifact writes; such files are never served or hashed.
pub const TEMP_SUFFIX: &str = "partial";
