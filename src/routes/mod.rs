mod contact;
mod health_check;
pub use contact::*;
pub use health_check::*;

/// Print an error and all its sources, one per line. Used for the `Debug`
/// impls of the crate's error types, so that `tracing` records the full chain.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{e}\n")?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{cause}")?;
        current = cause.source();
    }
    Ok(())
}
