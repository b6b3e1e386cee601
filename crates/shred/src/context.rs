/// Per-descent processing state, separate from configuration.
///
/// A context carries the recursion depth, the path components walked so far
/// (already sanitized), and the timestamp of the enclosing run. Descent
/// returns a new value; the original is never modified. The timestamp is
/// captured once when the root context is created and inherited unchanged by
/// every descendant, so all rows of one run share an identical time column.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingContext {
    pub current_depth: u32,
    pub path_components: Vec<String>,
    pub extract_time: String,
}

impl ProcessingContext {
    pub fn new(extract_time: impl Into<String>) -> ProcessingContext {
        ProcessingContext {
            current_depth: 0,
            path_components: Vec::new(),
            extract_time: extract_time.into(),
        }
    }

    /// A context for one level deeper, with `component` appended to the
    /// path. `component` must already be sanitized.
    pub fn descend(&self, component: impl Into<String>) -> ProcessingContext {
        let mut path_components = self.path_components.clone();
        path_components.push(component.into());
        ProcessingContext {
            current_depth: self.current_depth + 1,
            path_components,
            extract_time: self.extract_time.clone(),
        }
    }

    /// A context for an array element: depth and path reset, timestamp
    /// inherited. Array elements form new records in their own table.
    pub fn element(&self) -> ProcessingContext {
        ProcessingContext::new(self.extract_time.clone())
    }

    /// Joins the path components with `separator`. Empty at the root.
    pub fn build_path(&self, separator: &str) -> String {
        self.path_components.join(separator)
    }
}
