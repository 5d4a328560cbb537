#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluates `f` for every body index, on the rayon pool when `parallel` is
/// set and the `parallel` feature is enabled.
pub(crate) fn map_indexed<T, F>(n: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    if parallel {
        return (0..n).into_par_iter().map(f).collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;
    (0..n).map(f).collect()
}
