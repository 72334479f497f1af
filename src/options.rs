/// Options that tune how a request payload is deserialized.
///
/// A fresh value is meant to be built for every deserialization: the server
/// copies its template into each request task, so nothing here is ever shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeserializationOptions {
    without_root: bool,
}

impl DeserializationOptions {
    /// Create options with every flag unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the payload's top-level value is the target itself,
    /// instead of being nested under a root key.
    pub fn is_without_root(&self) -> bool {
        self.without_root
    }

    pub fn set_without_root(&mut self, without_root: bool) {
        self.without_root = without_root;
    }

    /// Builder form of [`DeserializationOptions::set_without_root`].
    pub fn without_root(mut self, without_root: bool) -> Self {
        self.set_without_root(without_root);
        self
    }
}
