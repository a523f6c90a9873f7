pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");

/// Global clonecn version string
///
/// All client code should refer directly to this copy instead of using various possibly conflicting environment
/// variables. Builds outside of a git checkout fall back to the package version.
pub const PROGRAM_VERSION: &str = match option_env!("VERGEN_GIT_DESCRIBE") {
    Some(x) => x,
    None => env!("CARGO_PKG_VERSION"),
};
