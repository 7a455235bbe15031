use std::collections::HashSet;

/// Hands out unique entry names within one export.
///
/// A name already taken becomes `base (1).ext`, then `base (2).ext`, and so
/// on, splitting at the last dot.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `candidate`, or the first free numbered variant of it.
    pub fn claim(&mut self, candidate: &str) -> String {
        if self.used.insert(candidate.to_string()) {
            return candidate.to_string();
        }

        let (base, ext) = match candidate.rsplit_once('.') {
            Some((base, ext)) => (base, Some(ext)),
            None => (candidate, None),
        };

        let mut counter = 1u32;
        loop {
            let name = match ext {
                Some(ext) => format!("{} ({}).{}", base, counter, ext),
                None => format!("{} ({})", base, counter),
            };
            if self.used.insert(name.clone()) {
                return name;
            }
            counter += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
