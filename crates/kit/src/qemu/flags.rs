//! Ordered flag storage for the QEMU command line.
//!
//! QEMU accepts the same switch several times (`-drive`, `-device`), so each
//! flag maps to a list of values. The map remembers the order in which flags
//! were first inserted so that the rendered command line is reproducible.

/// A value stored for a flag: either a single string or a list of them.
///
/// Both forms are normalized to a list when inserted into a [`FlagMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Scalar(String),
    Multi(Vec<String>),
}

impl FlagValue {
    pub fn into_values(self) -> Vec<String> {
        match self {
            FlagValue::Scalar(v) => vec![v],
            FlagValue::Multi(v) => v,
        }
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Scalar(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Scalar(value.to_owned())
    }
}

impl From<Vec<String>> for FlagValue {
    fn from(values: Vec<String>) -> Self {
        FlagValue::Multi(values)
    }
}

/// Insertion-ordered mapping from flag name (e.g. `-drive`) to its values.
///
/// An entry with no values is a standalone flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagMap {
    entries: Vec<(String, Vec<String>)>,
}

impl FlagMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, flag: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == flag)
    }

    /// Set the values of `flag`, replacing any previous values but keeping
    /// the flag's original position.
    pub fn set(&mut self, flag: impl Into<String>, value: impl Into<FlagValue>) {
        let flag = flag.into();
        let values = value.into().into_values();
        match self.position(&flag) {
            Some(idx) => self.entries[idx].1 = values,
            None => self.entries.push((flag, values)),
        }
    }

    /// Append values to `flag`, creating it if needed.
    pub fn append(&mut self, flag: impl Into<String>, value: impl Into<FlagValue>) {
        let flag = flag.into();
        let mut values = value.into().into_values();
        match self.position(&flag) {
            Some(idx) => self.entries[idx].1.append(&mut values),
            None => self.entries.push((flag, values)),
        }
    }

    /// Register `flag` without adding a value. Existing values are kept.
    pub fn touch(&mut self, flag: impl Into<String>) {
        let flag = flag.into();
        if self.position(&flag).is_none() {
            self.entries.push((flag, Vec::new()));
        }
    }

    /// Merge every entry of `other` into `self` using [`FlagMap::append`].
    pub fn extend(&mut self, other: FlagMap) {
        for (flag, values) in other.entries {
            self.append(flag, values);
        }
    }

    pub fn get(&self, flag: &str) -> Option<&[String]> {
        self.position(flag).map(|idx| self.entries[idx].1.as_slice())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.position(flag).is_some()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Render the map as a flat argument vector.
    ///
    /// A flag with values is repeated once per value, each occurrence
    /// immediately followed by its value; a flag with no values is emitted
    /// alone.
    pub fn flatten(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (flag, values) in &self.entries {
            if values.is_empty() {
                out.push(flag.clone());
                continue;
            }
            for value in values {
                out.push(flag.clone());
                out.push(value.clone());
            }
        }
        out
    }
}

impl IntoIterator for FlagMap {
    type Item = (String, Vec<String>);
    type IntoIter = std::vec::IntoIter<(String, Vec<String>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
