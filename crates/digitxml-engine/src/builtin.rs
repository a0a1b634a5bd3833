//! Transformations implemented natively instead of through an external
//! processor.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::document::{Attribute, Element, XmlDocument};

/// Built-in transform selectable by name from a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BuiltinTransform {
    /// Returns the document unchanged.
    Identity,
    /// Splits `quant="min max"` into `quantMin`/`quantMax` and renames the
    /// legacy `quantLow`/`quantHigh` pair.
    SplitQuant,
}

impl BuiltinTransform {
    /// Applies the transform to a copy of `document`.
    #[must_use]
    pub fn apply(self, document: &XmlDocument) -> XmlDocument {
        let mut output = document.clone();
        match self {
            Self::Identity => {}
            Self::SplitQuant => output.root_mut().rewrite(&mut split_quant),
        }
        output
    }
}

fn split_quant(element: &mut Element) {
    let touched = element
        .attributes()
        .iter()
        .any(|attribute| matches!(attribute.name.as_str(), "quant" | "quantLow" | "quantHigh"));
    if !touched {
        return;
    }

    let mut rewritten: Vec<Attribute> = Vec::with_capacity(element.attributes().len() + 1);
    for attribute in element.attributes() {
        match attribute.name.as_str() {
            "quant" => {
                let mut bounds = attribute.value.split_whitespace();
                if let Some(min) = bounds.next() {
                    upsert(&mut rewritten, "quantMin", min);
                }
                if let Some(max) = bounds.next() {
                    upsert(&mut rewritten, "quantMax", max);
                }
            }
            "quantLow" => upsert(&mut rewritten, "quantMin", &attribute.value),
            "quantHigh" => upsert(&mut rewritten, "quantMax", &attribute.value),
            _ => upsert(&mut rewritten, &attribute.name, &attribute.value),
        }
    }
    element.replace_attributes(rewritten);
}

fn upsert(attributes: &mut Vec<Attribute>, name: &str, value: &str) {
    if let Some(existing) = attributes.iter_mut().find(|attribute| attribute.name == name) {
        value.clone_into(&mut existing.value);
        return;
    }
    attributes.push(Attribute::new(name, value));
}
