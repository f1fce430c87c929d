#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    payload_size: u64,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, payload_size: u64) -> Self {
        Self { name, group, payload_size }
    }

    pub fn small(name: &'static str) -> Self {
        Self::new(name, TestGroup::Small, 4 * 1024)
    }

    pub fn normal(name: &'static str) -> Self {
        Self::new(name, TestGroup::Normal, 1024 * 1024)
    }

    pub fn large(name: &'static str) -> Self {
        Self::new(name, TestGroup::Large, 64 * 1024 * 1024)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    /// Declared size of the deferred payload in bytes
    pub fn payload_size(&self) -> u64 {
        self.payload_size
    }
}

/// Metadata fields sent along with every payload
pub static FIELDS: [(&str, &str); 3] =
    [("title", "nightly backup"), ("owner", "ops"), ("parameters", r#"{"options": {"x":1, "y":"hello", "z": true}}"#)];

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
