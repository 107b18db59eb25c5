//! Row values exchanged with the host.

/// One row flowing between this format and the host's row pipeline.
///
/// Columns are nullable text values. Rows produced by the read path carry
/// exactly one column (`value`) unless the host asked for no columns at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Row {
    values: Vec<Option<String>>,
}

impl Row {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// A single-column row holding `value`.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            values: vec![Some(value.into())],
        }
    }

    /// A single-column row whose value is null.
    pub fn null() -> Self {
        Self { values: vec![None] }
    }

    /// A row without columns.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_null_at(&self, i: usize) -> bool {
        self.values.get(i).is_none_or(Option::is_none)
    }

    pub fn get_str(&self, i: usize) -> Option<&str> {
        self.values.get(i).and_then(|v| v.as_deref())
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }
}
