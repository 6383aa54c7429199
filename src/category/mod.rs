//! Category tagging for outbound messages.
//!
//! Sessions accumulate category tags (seeded from the settings'
//! defaults) and join them with commas only when the header is
//! computed. An explicit override, when set, is used verbatim and is
//! never merged with the accumulated list. The computed header rides
//! in `X-SMTPAPI` as a JSON-like value embedding the joined list:
//! `{"category":["alerts,billing"]}`.

/// Name of the category-tagging header.
pub const CATEGORY_HEADER: &str = "X-SMTPAPI";

/// Category tags carried by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTags {
    accumulated: Vec<String>,
    override_value: Option<String>,
}

impl CategoryTags {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tag set seeded with the settings' default categories.
    pub fn seeded(defaults: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            accumulated: defaults.into_iter().map(Into::into).collect(),
            override_value: None,
        }
    }

    /// Appends a category. Duplicates are kept and order is preserved.
    pub fn add(&mut self, category: impl Into<String>) {
        self.accumulated.push(category.into());
    }

    /// Sets the override. It shadows the accumulated list verbatim,
    /// comma conventions and all.
    pub fn set_override(&mut self, value: impl Into<String>) {
        self.override_value = Some(value.into());
    }

    /// Clears the override, falling back to the accumulated list.
    pub fn clear_override(&mut self) {
        self.override_value = None;
    }

    /// Returns the override when set.
    pub fn override_value(&self) -> Option<&str> {
        self.override_value.as_deref()
    }

    /// Returns the accumulated categories in insertion order.
    pub fn accumulated(&self) -> &[String] {
        &self.accumulated
    }

    /// The comma-joined list the header embeds: the override verbatim
    /// when set, otherwise the accumulated list joined in insertion
    /// order. `None` when neither exists.
    pub fn joined(&self) -> Option<String> {
        if let Some(value) = &self.override_value {
            return Some(value.clone());
        }
        if self.accumulated.is_empty() {
            return None;
        }
        Some(self.accumulated.join(","))
    }

    /// Computes the header value, or `None` when the joined list is
    /// blank. A blank override still shadows the accumulated list, so
    /// it suppresses the header entirely.
    pub fn header_value(&self) -> Option<String> {
        let joined = self.joined()?;
        if joined.trim().is_empty() {
            return None;
        }
        Some(format!("{{\"category\":[\"{}\"]}}", joined))
    }
}
