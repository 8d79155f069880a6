use std::collections::BTreeMap;

/// A function name paired with the identity of its latest published version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionReference {
    /// The user-facing name used in the route table
    pub name: String,
    /// Opaque versioned reference, e.g. a qualified Lambda ARN
    pub identity: String,
}

impl FunctionReference {
    pub fn new<N, I>(name: N, identity: I) -> Self
    where
        N: Into<String>,
        I: Into<String>,
    {
        FunctionReference {
            name: name.into(),
            identity: identity.into(),
        }
    }
}

/// The outcome of one resolution pass, keyed by user-facing function name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedFunctions {
    functions: BTreeMap<String, FunctionReference>,
}

impl ResolvedFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: FunctionReference) {
        self.functions.insert(reference.name.clone(), reference);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionReference> {
        self.functions.get(name)
    }

    pub fn identity(&self, name: &str) -> Option<&str> {
        self.functions.get(name).map(|f| f.identity.as_str())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionReference> {
        self.functions.values()
    }
}

impl FromIterator<FunctionReference> for ResolvedFunctions {
    fn from_iter<T: IntoIterator<Item = FunctionReference>>(iter: T) -> Self {
        let mut resolved = ResolvedFunctions::new();
        for reference in iter {
            resolved.insert(reference);
        }
        resolved
    }
}
