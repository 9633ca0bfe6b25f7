/// Defines a cheaply-cloneable, `Arc`-backed handle type around an `Inner` struct.
///
/// Depot passes `Workspace`, `Package`, and `Command` across task boundaries constantly
/// (every subordinate process, every scheduler tick). Wrapping each in `Arc<Inner>` once,
/// here, means every other module just clones the handle instead of reasoning about
/// lifetimes across `tokio::spawn`.
macro_rules! shareable {
    ($name:ident, $inner:ty) => {
        #[derive(Clone)]
        pub struct $name(std::sync::Arc<$inner>);

        impl $name {
            pub fn new(inner: $inner) -> Self {
                $name(std::sync::Arc::new(inner))
            }

            #[allow(dead_code)]
            pub fn downgrade(&self) -> std::sync::Weak<$inner> {
                std::sync::Arc::downgrade(&self.0)
            }

            #[allow(dead_code)]
            pub fn from_weak(weak: &std::sync::Weak<$inner>) -> Option<Self> {
                weak.upgrade().map($name)
            }
        }

        impl std::ops::Deref for $name {
            type Target = $inner;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

pub(crate) use shareable;
