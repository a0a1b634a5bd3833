//! Element statistics computed directly on the tree.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::document::XmlDocument;

/// Default depth limit for [`summarize`].
pub const DEFAULT_SUMMARY_DEPTH: usize = 3;

/// Overview of a document's element structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureSummary {
    /// Root element name.
    pub root: String,
    /// Number of elements in the whole document.
    pub total_elements: usize,
    /// Deepest element level, root being 0.
    pub depth: usize,
    /// Element name counts per level, up to the requested depth.
    pub levels: Vec<LevelSummary>,
}

/// Element name counts at one depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    /// Level, root being 0.
    pub depth: usize,
    /// Occurrences per element name.
    pub elements: BTreeMap<String, usize>,
}

/// Summarises `document`, reporting per-level counts down to `max_depth`.
#[must_use]
pub fn summarize(document: &XmlDocument, max_depth: usize) -> StructureSummary {
    let mut total_elements = 0;
    let mut deepest = 0;
    let mut levels: Vec<LevelSummary> = Vec::new();

    document.root().visit(&mut |element, depth| {
        total_elements += 1;
        deepest = deepest.max(depth);
        if depth > max_depth {
            return;
        }
        while levels.len() <= depth {
            levels.push(LevelSummary {
                depth: levels.len(),
                elements: BTreeMap::new(),
            });
        }
        if let Some(level) = levels.get_mut(depth) {
            *level.elements.entry(element.name().to_owned()).or_default() += 1;
        }
    });

    StructureSummary {
        root: document.root().name().to_owned(),
        total_elements,
        depth: deepest,
        levels,
    }
}
