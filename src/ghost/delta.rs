//! Delta trait: how a ghost contribution is folded back into its owner.

/// *Delta* describes what a ghost copy sends home on `ghost_put` and how the
/// owner merges it.
pub trait Delta<V>: Sized {
    /// What travels back (often identical to `V`).
    type Part: Send;

    /// Extract the contribution held by a ghost copy.
    fn restrict(v: &V) -> Self::Part;

    /// Merge a returned contribution into the owner's value.
    fn fuse(local: &mut V, incoming: Self::Part);
}

/// Ghost value replaces the owner's value.
#[derive(Copy, Clone, Debug, Default)]
pub struct CopyDelta;

impl<V: Clone + Send> Delta<V> for CopyDelta {
    type Part = V;
    #[inline]
    fn restrict(v: &V) -> V {
        v.clone()
    }
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local = incoming;
    }
}

/// Ghost contributions are summed into the owner (scatter-add).
#[derive(Copy, Clone, Debug, Default)]
pub struct AddDelta;

impl<V> Delta<V> for AddDelta
where
    V: std::ops::AddAssign + Copy + Send,
{
    type Part = V;
    #[inline]
    fn restrict(v: &V) -> V {
        *v
    }
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local += incoming;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_overwrites_add_accumulates() {
        let mut a = 1.5f64;
        CopyDelta::fuse(&mut a, CopyDelta::restrict(&4.0));
        assert_eq!(a, 4.0);
        AddDelta::fuse(&mut a, <AddDelta as Delta<f64>>::restrict(&2.0));
        assert_eq!(a, 6.0);
    }
}
