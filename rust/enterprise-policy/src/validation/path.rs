use std::fmt::{Display, Write};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Segment {
    Field(String),
    Index(usize),
    Key(String),
}

/// Points at a field within a document, such as `spec.targetRefs[1].kind`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// The root of every policy document that gets validated.
    pub fn spec() -> Self {
        Self::default().field("spec")
    }

    fn push(&self, segment: Segment) -> Self {
        let mut path = self.clone();
        path.0.push(segment);
        path
    }

    pub fn field(&self, name: &str) -> Self {
        self.push(Segment::Field(name.to_string()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.push(Segment::Index(index))
    }

    /// An entry of a keyed map, such as a named JWT provider.
    pub fn key(&self, key: &str) -> Self {
        self.push(Segment::Key(key.to_string()))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Field(name) => {
                    if i > 0 {
                        f.write_char('.')?;
                    }
                    f.write_str(name)?;
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Key(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::FieldPath;

    #[test]
    fn test_display() {
        let refs = FieldPath::spec().field("targetRefs");
        assert_eq!(refs.to_string(), "spec.targetRefs");
        assert_eq!(refs.index(1).field("kind").to_string(), "spec.targetRefs[1].kind");
        assert_eq!(
            FieldPath::spec()
                .field("entJWT")
                .field("beforeExtAuth")
                .field("providers")
                .key("okta")
                .field("clockSkewSeconds")
                .to_string(),
            "spec.entJWT.beforeExtAuth.providers[okta].clockSkewSeconds"
        );
    }
}
