//! Various utilities shared by the Lumen crates

pub mod packed;

mod result_ext;
pub use result_ext::AnyhowResultExt;

pub type AnyResult<T = (), E = anyhow::Error> = anyhow::Result<T, E>;

/// Shorthand for `Ok(())`, cause it looks ugly
pub const fn ok<E>() -> Result<(), E> {
    Ok(())
}

/// Returns the last path segment of a type name, `lumen::models::TransformableModel` becomes
/// `TransformableModel`. Generic arguments are left alone.
///
/// ```
/// use lumen_utils::short_type_name;
/// assert_eq!(short_type_name("lumen::models::TransformableModel"), "TransformableModel");
/// assert_eq!(short_type_name("dyn lumen::models::Shape"), "dyn Shape");
/// assert_eq!(short_type_name("u32"), "u32");
/// ```
pub fn short_type_name(name: &str) -> String {
    let (prefix, path) = match name.strip_prefix("dyn ") {
        Some(rest) => ("dyn ", rest),
        None => ("", name),
    };

    let generics = path.find('<').unwrap_or(path.len());
    let (path, tail) = path.split_at(generics);
    let last = path.rsplit("::").next().unwrap_or(path);

    format!("{prefix}{last}{tail}")
}
