use const_default1::ConstDefault;

/// Provides a constant default value.
///
/// This is a bridge to [`ConstDefault`]: implementing the latter for a type
/// makes it usable wherever this crate expects a constant initializer.
pub trait Init {
    /// `Self`'s default value.
    const INIT: Self;
}

impl<T: ConstDefault> Init for T {
    const INIT: Self = <T as ConstDefault>::DEFAULT;
}
