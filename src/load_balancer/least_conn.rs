//! Least outstanding requests selection.

use crate::load_balancer::backend::BackendTarget;

/// Select the target with the fewest requests in flight.
///
/// Ties go to whichever candidate the iterator yields first; callers must
/// not rely on which one that is.
pub fn select_least_outstanding<'a, I>(targets: I) -> Option<&'a mut BackendTarget>
where
    I: IntoIterator<Item = &'a mut BackendTarget>,
{
    targets.into_iter().min_by_key(|t| t.load())
}
