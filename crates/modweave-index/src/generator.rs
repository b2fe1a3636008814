//! Index aggregation

use std::collections::BTreeSet;

use crate::naming::stable_name;

/// Prefix of every generated index name
pub const INDEX_PREFIX: &str = "LibraryIndex_";

/// Normalized identity of an element name
pub fn normalize_name(name: &str) -> &str {
    name.trim()
}

/// The canonical summary of a collection of elements.
///
/// `name` and `names` are identity-bearing. `originating` points back at the
/// elements the artifact was built from and only serves attribution.
#[derive(Debug)]
pub struct IndexArtifact<'a, E> {
    name: String,
    names: Vec<String>,
    originating: Vec<&'a E>,
}

impl<'a, E> IndexArtifact<'a, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sorted, distinct element names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn originating(&self) -> &[&'a E] {
        &self.originating
    }
}

/// Aggregate elements into one artifact.
///
/// Returns `None` when no element has a non-blank name.
pub fn aggregate<'a, E, F>(elements: &'a [E], name_of: F) -> Option<IndexArtifact<'a, E>>
where
    F: Fn(&E) -> String,
{
    if elements.is_empty() {
        return None;
    }

    let distinct: BTreeSet<String> = elements
        .iter()
        .map(|e| normalize_name(&name_of(e)).to_string())
        .filter(|n| !n.is_empty())
        .collect();

    if distinct.is_empty() {
        return None;
    }

    let names: Vec<String> = distinct.into_iter().collect();
    let name = format!("{}{}", INDEX_PREFIX, stable_name(&names));

    Some(IndexArtifact {
        name,
        names,
        originating: elements.iter().collect(),
    })
}

/// Writes one index artifact per generation round.
///
/// Implementors decide how an element is named and where the artifact goes;
/// [`IndexGenerator::generate`] guarantees the artifact is canonical.
pub trait IndexGenerator {
    type Element;
    type Error;

    fn element_name(&self, element: &Self::Element) -> String;

    fn write_index(&mut self, artifact: &IndexArtifact<'_, Self::Element>) -> Result<(), Self::Error>;

    /// Aggregate `elements` and write the artifact exactly once.
    ///
    /// Empty input writes nothing and returns `Ok(None)`.
    fn generate(&mut self, elements: &[Self::Element]) -> Result<Option<String>, Self::Error> {
        let artifact = match aggregate(elements, |e| self.element_name(e)) {
            Some(artifact) => artifact,
            None => return Ok(None),
        };

        self.write_index(&artifact)?;
        Ok(Some(artifact.name().to_string()))
    }
}
